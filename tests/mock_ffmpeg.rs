//! Mock toolchain binary used by the end-to-end tests. Impersonates both
//! ffprobe (`-show_entries ... -of json`) and ffmpeg (capability listings
//! and encode runs). Behavior is keyed on the input filename so parallel
//! tests never race on environment variables:
//!   - names containing "slow" encode for ~30 s (until signalled)
//!   - names containing "failenc" exit non-zero from the encode
//!   - names containing "noprobe" make the probe exit non-zero

use std::path::PathBuf;
use std::{env, fs, thread, time::Duration};

fn main() {
    let argv: Vec<String> = env::args().skip(1).collect();

    if argv.iter().any(|arg| arg == "-show_entries") {
        probe_mode(&argv);
        return;
    }
    if let Some(listing) = argv.iter().find_map(|arg| capability_listing(arg)) {
        print!("{listing}");
        return;
    }
    if argv.first().map(String::as_str) == Some("-y") {
        encode_mode(&argv);
    }
    // Invoked bare (e.g. by the test harness itself): succeed quietly.
}

fn input_of(argv: &[String]) -> Option<&String> {
    argv.windows(2)
        .find(|pair| pair[0] == "-i")
        .map(|pair| &pair[1])
}

fn probe_mode(argv: &[String]) {
    let source = argv.last().cloned().unwrap_or_default();
    if source.contains("noprobe") {
        eprintln!("{source}: Invalid data found when processing input");
        std::process::exit(1);
    }

    let vcodec = if source.contains("vp9") { "vp9" } else { "h264" };
    println!(
        r#"{{
    "streams": [
        {{
            "index": 0,
            "codec_name": "{vcodec}",
            "codec_type": "video",
            "width": 1280,
            "height": 720,
            "avg_frame_rate": "25/1",
            "color_primaries": "bt709",
            "color_transfer": "bt709",
            "color_space": "bt709"
        }},
        {{
            "index": 1,
            "codec_name": "aac",
            "codec_type": "audio",
            "channels": 2
        }}
    ],
    "format": {{
        "duration": "2.000000"
    }}
}}"#
    );
}

fn capability_listing(arg: &str) -> Option<&'static str> {
    match arg {
        "-encoders" => Some(
            " V..... libx264        H.264 / AVC / MPEG-4 AVC\n\
 V..... libx265        H.265 / HEVC\n\
 V..... libvpx-vp9     VP9\n\
 V..... libsvtav1      SVT-AV1\n\
 V..... prores_ks      Apple ProRes\n\
 V..... gif            GIF\n\
 V..... png            PNG\n\
 V..... mjpeg          MJPEG\n\
 V..... libwebp        WebP\n\
 A..... aac            AAC (Advanced Audio Coding)\n\
 A..... libmp3lame     MP3 (MPEG audio layer 3)\n\
 A..... libopus        Opus\n\
 A..... flac           FLAC\n\
 A..... pcm_s16le      PCM signed 16-bit little-endian\n",
        ),
        "-formats" => Some(
            " DE mov,mp4,m4a,3gp,3g2,mj2 QuickTime / MOV\n\
  E mp4             MP4 (MPEG-4 Part 14)\n\
  E matroska        Matroska\n\
  E webm            WebM\n\
  E ipod            iPod H.264 MP4 (MPEG-4 Part 14)\n\
  E gif             GIF Animation\n\
  E mp3             MP3 (MPEG audio layer 3)\n\
  E flac            raw FLAC\n\
  E wav             WAV / WAVE (Waveform Audio)\n\
  E image2          image2 sequence\n",
        ),
        "-filters" => Some(
            "scale               V->V       Scale the input video size.\n\
palettegen          V->V       Find the optimal palette for a video.\n\
paletteuse          VV->V      Use a palette to downsample an input video.\n\
subtitles           V->V       Render text subtitles onto input video.\n",
        ),
        _ => None,
    }
}

fn encode_mode(argv: &[String]) {
    let input = input_of(argv).cloned().unwrap_or_default();
    let output = argv.last().cloned().unwrap_or_default();

    eprintln!("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from '{input}':");
    eprintln!("  Duration: 00:00:02.00, start: 0.000000, bitrate: 1024 kb/s");

    if input.contains("failenc") {
        eprintln!("Conversion failed!");
        std::process::exit(1);
    }

    let (ticks, tick_ms) = if input.contains("slow") {
        (600u64, 50u64)
    } else {
        (3u64, 20u64)
    };

    for tick in 1..=ticks {
        eprintln!("out_time_ms={}", tick * 100_000);
        eprintln!("fps=25.0");
        eprintln!("speed=1.0x");
        eprintln!("progress=continue");
        thread::sleep(Duration::from_millis(tick_ms));
    }
    eprintln!("out_time_ms=2000000");
    eprintln!("progress=end");

    if !output.is_empty() && output != "-" {
        let path = PathBuf::from(&output);
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let _ = fs::write(&path, b"mock media payload");
    }
}
