//! Ember CLI
//!
//! ```text
//! ember                      interactive (needs the repl module)
//! ember <file> [--esm]       run a script or ES module
//! ember eval <source>        run inline source
//! ember --                   run a script read from stdin
//! ember build [target]       build (needs the build module) [--config] [--dump]
//! ember init [name]
//! ember clean
//! ember --bare <source>      only the vm capability, no bootstrap
//! ```
//!
//! `EMBER_LOG` sets the log filter (default `warn`).

use anyhow::Result;
use ember::Host;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging() {
    let filter = EnvFilter::try_from_env("EMBER_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    init_logging();
    ember::boot(Host::new(), std::env::args())?;
    Ok(())
}
