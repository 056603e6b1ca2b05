//! Linear token accumulator for the encoder command line, plus the splice
//! helper the runner uses to turn a decision into a full invocation.

use std::path::Path;

use crate::domain::Container;

/// Every decision's token vector starts with this progress contract: the
/// encoder reports machine-readable progress on the stderr channel and
/// suppresses the human stats line.
pub(crate) const PROGRESS_PREFIX: [&str; 3] = ["-progress", "pipe:2", "-nostats"];

pub(crate) struct ArgBuilder {
    args: Vec<String>,
}

impl ArgBuilder {
    pub(crate) fn new() -> Self {
        Self {
            args: PROGRESS_PREFIX.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub(crate) fn flag(&mut self, flag: &str) {
        self.args.push(flag.to_string());
    }

    pub(crate) fn kv(&mut self, flag: &str, value: impl Into<String>) {
        self.args.push(flag.to_string());
        self.args.push(value.into());
    }

    pub(crate) fn extend(&mut self, tokens: impl IntoIterator<Item = String>) {
        self.args.extend(tokens);
    }

    /// Container finalization: faststart relocation where the rule demands
    /// it, then the pinned muxer.
    pub(crate) fn finish_container(&mut self, container: Container, requires_faststart: bool) {
        if requires_faststart {
            self.kv("-movflags", "+faststart");
        }
        if let Some(muxer) = container.muxer() {
            self.kv("-f", muxer);
        }
    }

    pub(crate) fn into_args(self) -> Vec<String> {
        self.args
    }
}

/// Assemble the full encoder invocation from a decision's token vector.
/// `-y` leads, the input splices in directly after the progress prefix,
/// and `-nostdin` plus the output path close the command.
pub fn assemble_invocation(decision_args: &[String], input: &str, output: &Path) -> Vec<String> {
    let mut args = Vec::with_capacity(decision_args.len() + 5);
    args.push("-y".to_string());

    let splice_at = if decision_args.len() >= PROGRESS_PREFIX.len()
        && decision_args[..PROGRESS_PREFIX.len()]
            .iter()
            .zip(PROGRESS_PREFIX)
            .all(|(a, b)| a == b)
    {
        PROGRESS_PREFIX.len()
    } else {
        0
    };

    args.extend(decision_args[..splice_at].iter().cloned());
    args.push("-i".to_string());
    args.push(input.to_string());
    args.extend(decision_args[splice_at..].iter().cloned());
    args.push("-nostdin".to_string());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Quote an invocation so it can be copied from the UI and replayed in a
/// shell.
pub fn format_command_for_log(program: &str, args: &[String]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"') {
            rendered.push('"');
            rendered.push_str(&arg.replace('"', "\\\""));
            rendered.push('"');
        } else {
            rendered.push_str(arg);
        }
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn builder_always_leads_with_the_progress_contract() {
        let builder = ArgBuilder::new();
        let args = builder.into_args();
        assert_eq!(args, vec!["-progress", "pipe:2", "-nostats"]);
    }

    #[test]
    fn container_finalization_appends_faststart_then_muxer() {
        let mut builder = ArgBuilder::new();
        builder.finish_container(Container::Mp4, true);
        let args = builder.into_args();
        assert_eq!(
            args[3..],
            ["-movflags", "+faststart", "-f", "mp4"].map(String::from)
        );
    }

    #[test]
    fn invocation_splices_input_after_prefix_and_closes_with_output() {
        let decision_args: Vec<String> = [
            "-progress", "pipe:2", "-nostats", "-map", "0:v:0?", "-c:v", "copy", "-f", "mp4",
        ]
        .map(String::from)
        .to_vec();
        let full = assemble_invocation(&decision_args, "/videos/in.mov", &PathBuf::from("/out/o.mp4"));
        assert_eq!(
            full,
            [
                "-y", "-progress", "pipe:2", "-nostats", "-i", "/videos/in.mov", "-map", "0:v:0?",
                "-c:v", "copy", "-f", "mp4", "-nostdin", "/out/o.mp4",
            ]
            .map(String::from)
            .to_vec()
        );
    }

    #[test]
    fn command_log_quotes_arguments_containing_whitespace() {
        let args = ["-i".to_string(), "/videos/My Clip.mov".to_string()];
        assert_eq!(
            format_command_for_log("ffmpeg", &args),
            "ffmpeg -i \"/videos/My Clip.mov\""
        );
    }
}
