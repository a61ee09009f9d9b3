use std::sync::Once;

use tracing_subscriber::{
    filter::{Directive, LevelFilter},
    fmt, EnvFilter,
};

static TRACING_INIT: Once = Once::new();

const FALLBACK_DIRECTIVE: &str = "tally=info";

/// Installs the global `fmt` subscriber: `RUST_LOG` plus `directive`.
///
/// An unparsable directive falls back to `tally=info`. Does nothing if a
/// subscriber is already installed.
pub fn init_tracing(directive: &str) {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::from_default_env().add_directive(parse_directive(directive));
        let _ = fmt().with_env_filter(filter).try_init();
    });
}

fn parse_directive(directive: &str) -> Directive {
    directive
        .parse()
        .or_else(|_| FALLBACK_DIRECTIVE.parse())
        .unwrap_or_else(|_| Directive::from(LevelFilter::INFO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directives_fall_back() {
        assert_eq!(parse_directive("tally=debug").to_string(), "tally=debug");
        assert_eq!(parse_directive("tally=loud").to_string(), FALLBACK_DIRECTIVE);
    }
}
