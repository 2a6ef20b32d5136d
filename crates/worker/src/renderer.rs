//! [`Renderer`] that shells out to an ImageMagick-compatible command.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use tokio::runtime::Handle;

use cardsync_core::collaborators::{RenderResult, Renderer};
use cardsync_core::render::RenderSpec;
use cardsync_core::CoreError;

/// Card canvas size in pixels.
const CARD_WIDTH: u32 = 3200;
const CARD_HEIGHT: u32 = 1800;

/// Title point size at `font_size = 1.0`.
const BASE_TITLE_POINTSIZE: f64 = 157.41;
const LABEL_POINTSIZE: u32 = 62;
const BLUR_SIGMA: u32 = 30;

/// Maximum stderr bytes kept in a failure message.
const MAX_DETAIL_LEN: usize = 2000;

/// Renders one card per invocation of `program`.
///
/// Each invocation runs on `runtime` and is killed once it exceeds
/// `timeout`. [`Renderer::render`] blocks the calling thread, so it must be
/// called from a blocking context such as `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    timeout: Duration,
    runtime: Handle,
}

impl CommandRenderer {
    pub fn new(program: impl Into<String>, timeout: Duration, runtime: Handle) -> Self {
        Self {
            program: program.into(),
            timeout,
            runtime,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Command-line arguments for `spec`, ending with the output path.
    pub fn build_args(spec: &RenderSpec) -> Vec<String> {
        let size = format!("{CARD_WIDTH}x{CARD_HEIGHT}");
        let mut args = vec![
            spec.source_file.clone(),
            "-resize".into(),
            format!("{size}^"),
            "-gravity".into(),
            "center".into(),
            "-extent".into(),
            size,
        ];
        if spec.blur {
            args.extend(["-blur".into(), format!("0x{BLUR_SIGMA}")]);
        }
        if spec.grayscale {
            args.extend(["-colorspace".into(), "gray".into()]);
        }

        // Title, anchored to the bottom edge.
        let title_offset = 190 + spec.font_vertical_shift;
        args.extend([
            "-gravity".into(),
            "south".into(),
            "-font".into(),
            spec.font_file.clone(),
            "-fill".into(),
            spec.font_color.clone(),
            "-pointsize".into(),
            format!("{:.2}", BASE_TITLE_POINTSIZE * spec.font_size),
            "-kerning".into(),
            format!("{:.2}", spec.font_kerning),
            "-interline-spacing".into(),
            spec.font_interline_spacing.to_string(),
            "-strokewidth".into(),
            format!("{:.2}", spec.font_stroke_width),
            "-annotate".into(),
            format!("+0+{title_offset}"),
            annotate_text(&spec.title_text()),
        ]);

        let label = [spec.season_text.as_str(), spec.episode_text.as_str()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" \u{2022} ");
        if !label.is_empty() {
            args.extend([
                "-pointsize".into(),
                LABEL_POINTSIZE.to_string(),
                "-annotate".into(),
                "+0+80".into(),
                annotate_text(&label),
            ]);
        }

        args.push(spec.card_file.clone());
        args
    }

    async fn run(&self, spec: &RenderSpec) -> Result<RenderResult, CoreError> {
        let output_path = Path::new(&spec.card_file);
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::io(parent.display().to_string(), e))?;
        }

        tracing::debug!(program = %self.program, card_file = %spec.card_file, "Running renderer");
        let result = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.program)
                .args(Self::build_args(spec))
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let (success, detail) = match result {
            Ok(Ok(output)) => {
                let success = output.status.success();
                (success, (!success).then(|| failure_detail(&output)))
            }
            Ok(Err(e)) => return Err(CoreError::io(self.program.clone(), e)),
            Err(_) => {
                tracing::error!(
                    program = %self.program,
                    card_file = %spec.card_file,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Renderer timed out",
                );
                (false, Some(format!("timed out after {:?}", self.timeout)))
            }
        };
        let byte_size = tokio::fs::metadata(output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(RenderResult {
            success,
            output_path: output_path.to_path_buf(),
            byte_size,
            detail,
        })
    }
}

impl Renderer for CommandRenderer {
    fn render(&self, spec: &RenderSpec) -> Result<RenderResult, CoreError> {
        self.runtime.block_on(self.run(spec))
    }
}

/// Text for an `-annotate` argument, taken literally by the raster tool.
///
/// `%` starts a format escape and a leading `@` reads the text from a file.
fn annotate_text(text: &str) -> String {
    let escaped = text.replace('%', "%%");
    match escaped.strip_prefix('@') {
        Some(rest) => format!("\\@{rest}"),
        None => escaped,
    }
}

/// Exit code plus trimmed stderr, bounded to [`MAX_DETAIL_LEN`] bytes.
fn failure_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut text = format!("exit code {:?}: {}", output.status.code(), stderr.trim());
    if text.len() > MAX_DETAIL_LEN {
        let mut cut = MAX_DETAIL_LEN;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::Map;

    use super::*;

    fn spec(card_file: &str) -> RenderSpec {
        RenderSpec {
            card_type: "standard".into(),
            title_lines: vec!["The Beginning".into(), "Of Everything".into()],
            title_top_heavy: false,
            season_text: "Season 1".into(),
            episode_text: "Episode 3".into(),
            hide_season_text: false,
            hide_episode_text: false,
            font_file: "fonts/Sequel-Neue.otf".into(),
            font_color: "#EBEBEB".into(),
            font_size: 1.0,
            font_kerning: 1.0,
            font_stroke_width: 1.0,
            font_interline_spacing: 0,
            font_vertical_shift: 0,
            blur: false,
            grayscale: false,
            source_file: "/sources/s1e3.jpg".into(),
            card_file: card_file.into(),
            extras: Map::new(),
            source_override: None,
        }
    }

    // -- Arguments --

    #[test]
    fn args_start_with_source_and_end_with_card() {
        let args = CommandRenderer::build_args(&spec("/cards/out.jpg"));
        assert_eq!(args.first().map(String::as_str), Some("/sources/s1e3.jpg"));
        assert_eq!(args.last().map(String::as_str), Some("/cards/out.jpg"));
        assert!(args.contains(&"The Beginning\nOf Everything".to_string()));
        assert!(args.contains(&"Season 1 \u{2022} Episode 3".to_string()));
        assert!(!args.contains(&"-blur".to_string()));
    }

    #[test]
    fn effects_and_hidden_labels() {
        let mut spec = spec("/cards/out.jpg");
        spec.blur = true;
        spec.grayscale = true;
        spec.season_text = String::new();
        spec.font_size = 2.0;
        let args = CommandRenderer::build_args(&spec);
        assert!(args.windows(2).any(|w| w[0] == "-blur" && w[1] == "0x30"));
        assert!(args.windows(2).any(|w| w[0] == "-colorspace" && w[1] == "gray"));
        assert!(args.contains(&"314.82".to_string()));
        assert!(args.contains(&"Episode 3".to_string()));
    }

    #[test]
    fn no_label_when_both_hidden() {
        let mut spec = spec("/cards/out.jpg");
        spec.season_text = String::new();
        spec.episode_text = String::new();
        let args = CommandRenderer::build_args(&spec);
        assert_eq!(args.iter().filter(|a| *a == "-annotate").count(), 1);
    }

    #[test]
    fn annotate_text_is_taken_literally() {
        let mut spec = spec("/cards/out.jpg");
        spec.title_lines = vec!["@midnight".into()];
        spec.episode_text = "100% Wolf".into();
        let args = CommandRenderer::build_args(&spec);
        assert!(args.contains(&"\\@midnight".to_string()));
        assert!(args.contains(&"Season 1 \u{2022} 100%% Wolf".to_string()));

        assert_eq!(annotate_text("a@b"), "a@b");
        assert_eq!(annotate_text("@50%"), "\\@50%%");
    }

    // -- Invocation --

    fn renderer(program: &str, timeout: Duration) -> CommandRenderer {
        CommandRenderer::new(program, timeout, Handle::current())
    }

    /// Runs `render` off the async worker threads, as the runner does.
    async fn render_blocking(
        renderer: CommandRenderer,
        spec: RenderSpec,
    ) -> Result<RenderResult, CoreError> {
        tokio::task::spawn_blocking(move || renderer.render(&spec))
            .await
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn failing_command_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let card = dir.path().join("nested").join("card.jpg");
        let renderer = renderer("false", Duration::from_secs(10));

        let result = render_blocking(renderer, spec(card.to_str().unwrap()))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.byte_size, 0);
        assert!(result.detail.unwrap().starts_with("exit code"));
        assert!(card.parent().unwrap().is_dir());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_program_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let card = dir.path().join("card.jpg");
        let renderer = renderer("cardsync-no-such-renderer", Duration::from_secs(10));

        assert_matches!(
            render_blocking(renderer, spec(card.to_str().unwrap())).await,
            Err(CoreError::Io { .. })
        );
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn hung_renderer_is_killed_at_timeout() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-render.sh");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let card = dir.path().join("card.jpg");
        let renderer = renderer(script.to_str().unwrap(), Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = render_blocking(renderer, spec(card.to_str().unwrap()))
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!result.success);
        assert!(result.detail.unwrap().contains("timed out"));
        assert_eq!(result.byte_size, 0);
    }
}
