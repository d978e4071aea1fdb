use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Startup progress reporting on stderr.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    /// Pretty spinners when stderr is a terminal, plain lines otherwise.
    pub fn detect() -> Self {
        Self::new(UiMode::Auto, std::io::stderr().is_terminal())
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && !matches!(self.mode, UiMode::Plain)
    }

    /// Announce a startup stage. The returned guard reports its duration on drop.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Run `work` as a named stage, marking the stage failed if it errors.
    pub fn run<T, F>(&self, name: &str, work: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> anyhow::Result<T>,
    {
        let mut guard = self.stage(name);
        let result = work();
        guard.failed = result.is_err();
        result
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
    failed: bool,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
            failed: false,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let mark = if self.failed { "✘" } else { "✔" };
        let message = format!(
            "{} {} ({})",
            mark,
            self.name,
            format_duration(self.start.elapsed())
        );
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
