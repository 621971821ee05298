use std::io;

use tracing_core::Level;
use tracing_subscriber::{filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Logging;

/// Install the global subscriber.
///
/// Events go to stderr. Object store SDK internals are limited to warnings,
/// everything else follows the configured level.
pub fn init(logging: &Logging) {
    let format = fmt::format().with_target(false).compact();

    let filter = ["aws_config", "aws_smithy_http", "aws_smithy_client", "hyper"]
        .into_iter()
        .fold(Targets::new(), |targets, target| {
            targets.with_target(target, Level::WARN)
        })
        .with_default(logging.level);

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format).with_writer(io::stderr))
        .with(filter)
        .init();
}
