//set tracing log level based on env var
pub fn log_level() -> tracing::Level {
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    parse_level(&log_level)
}

fn parse_level(log_level: &str) -> tracing::Level {
    match log_level {
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

//init json tracing, span close events included
pub fn init() {
    tracing_subscriber::FmtSubscriber::builder()
        .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE)
        .with_max_level(log_level())
        .json()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(parse_level("debug"), tracing::Level::DEBUG);
        assert_eq!(parse_level("error"), tracing::Level::ERROR);
        assert_eq!(parse_level("verbose"), tracing::Level::INFO);
    }
}
