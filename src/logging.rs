use colored::{Color, ColoredString, Colorize};
use log::{Level, LevelFilter, SetLoggerError};

/// The crates of this workspace, with the label and color of their records.
/// They log at the configured level.
const LOCAL_CRATES: [(&str, &str, Color); 4] = [
    ("yamdb", "YAMDB", Color::BrightCyan),
    ("yamdb_core", "CORE", Color::Blue),
    ("yamdb_collab", "COLLAB", Color::BrightMagenta),
    ("yamdb_server", "SERVER", Color::BrightGreen),
];

/// Sets up logging to stdout. Workspace crates log at `level`, everything else
/// (sqlx, hyper, reqwest...) only gets through with warnings and errors.
pub fn init_logger(level: LevelFilter) -> Result<(), SetLoggerError> {
    let dispatch = LOCAL_CRATES.iter().fold(
        fern::Dispatch::new().level(external_level(level)),
        |dispatch, (name, ..)| dispatch.level_for(*name, level),
    );

    dispatch
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {} {:^8} {}",
                badge(record.level()),
                chrono::Local::now().format("%H:%M:%S").to_string().bright_black(),
                label(record.target()),
                message
            ))
        })
        .chain(std::io::stdout())
        .apply()
}

fn external_level(level: LevelFilter) -> LevelFilter {
    level.min(LevelFilter::Warn)
}

/// The crate a record comes from, colored if it is one of ours
fn label(target: &str) -> ColoredString {
    let name = target.split("::").next().unwrap_or_default();

    match LOCAL_CRATES.iter().find(|(crate_name, ..)| *crate_name == name) {
        Some((_, label, color)) => label.color(*color),
        None => name.normal(),
    }
}

fn badge(level: Level) -> ColoredString {
    let (text, background) = match level {
        Level::Error => (" ERR ", Color::Red),
        Level::Warn => (" WRN ", Color::Yellow),
        Level::Info => (" INF ", Color::Blue),
        Level::Debug => (" DBG ", Color::White),
        Level::Trace => (" TRC ", Color::BrightBlack),
    };

    text.black().on_color(background).bold()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(label("yamdb_collab::auth").to_string(), "COLLAB".bright_magenta().to_string());
        assert_eq!(label("yamdb::config").to_string(), "YAMDB".bright_cyan().to_string());
        assert_eq!(label("sqlx::query").to_string(), "sqlx".normal().to_string());
    }

    #[test]
    fn test_external_level() {
        assert_eq!(external_level(LevelFilter::Trace), LevelFilter::Warn);
        assert_eq!(external_level(LevelFilter::Info), LevelFilter::Warn);
        assert_eq!(external_level(LevelFilter::Error), LevelFilter::Error);
        assert_eq!(external_level(LevelFilter::Off), LevelFilter::Off);
    }
}
