use env_logger::{Builder, Env, Target};
use std::io::Write;

/// Chatty output for this crate, quiet for everything else; `RUST_LOG`
/// still overrides the default.
pub fn setup_logging() {
    let env = Env::default().default_filter_or("warn,lanshare=info");

    Builder::from_env(env)
        .target(Target::Stdout)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
