use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

const WINDOW_TEMPLATE: &str =
    "{prefix:.bold} {msg:.bold} [{elapsed_precise}] {bar:40.green/white} {pos:>6}/{len:6} ETA {eta}";

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(WINDOW_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

pub fn bar(len: u64, prefix: &str, msg: &str) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(len), ProgressDrawTarget::stderr_with_hz(10));
    pb.set_style(bar_style());
    pb.set_prefix(prefix.to_string());
    pb.set_message(msg.to_string());
    pb
}
