//! Engine command construction.

use crate::formats::TargetFormat;

/// Extension used for the input entry when the source name has none.
pub const PLACEHOLDER_INPUT_EXTENSION: &str = "mp4";

/// Filter chain for the animated GIF target.
const GIF_FILTER: &str = "fps=10,scale=480:-1:flags=lanczos";

/// One engine invocation: scratch entry names plus the argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxCommand {
    pub input_name: String,
    pub output_name: String,
    pub args: Vec<String>,
}

impl RemuxCommand {
    /// Build the command for remuxing an input with the given extension hint.
    pub fn new(extension_hint: Option<&str>, target: TargetFormat) -> Self {
        let input_ext = extension_hint
            .filter(|ext| !ext.is_empty())
            .unwrap_or(PLACEHOLDER_INPUT_EXTENSION);
        let input_name = format!("input.{}", input_ext);
        let output_name = format!("output.{}", target.extension());

        let mut args: Vec<String> = vec!["-i".into(), input_name.clone()];
        match target {
            TargetFormat::Gif => {
                args.extend(["-vf", GIF_FILTER, "-loop", "0"].map(String::from));
            }
            _ => {
                args.extend(["-c:v", "copy", "-c:a", "copy"].map(String::from));
                args.extend(target.streaming_flags().iter().map(|s| s.to_string()));
            }
        }
        args.push(output_name.clone());

        Self {
            input_name,
            output_name,
            args,
        }
    }

    /// Whether any stream is copied rather than re-encoded.
    pub fn uses_stream_copy(&self) -> bool {
        self.args.iter().any(|arg| arg == "copy")
    }
}
