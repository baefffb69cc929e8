//! Per-registry log verbosity.
//!
//! Each registry carries its own [`LevelFilter`](log::LevelFilter) from
//! [`Config::log_level`](crate::config::Config::log_level).  `vlog!` checks it
//! before handing the record to the global `log` facade, so a quiet registry
//! stays quiet even when the global max level is `Trace`.

/// `vlog!(filter, Level, "fmt", args..)`
macro_rules! vlog {
    ($filter:expr, $lvl:ident, $($arg:tt)+) => {{
        let lvl = ::log::Level::$lvl;
        if lvl <= $filter {
            ::log::log!(lvl, $($arg)+);
        }
    }};
}

pub(crate) use vlog;
