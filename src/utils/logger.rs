use env_logger::{Builder, Target};
use log::LevelFilter;
use std::io::Write;

pub fn setup_logging() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .filter_level(LevelFilter::Info)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();
}
