//! Integration tests, built as one binary.
//!
//! - scenarios: the documented editing walkthroughs
//! - wire: instruction, operation and tree snapshots as JSON
//! - convergence: replicas agree whatever the delivery order
//! - events: observer mailboxes across commit and rollback

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("concurrentree=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod convergence;
mod events;
mod scenarios;
mod wire;
