//! Push-fed runtime with ordering: a fake webhook delivers updates out of order and
//! loses one of them. The ordering buffer restores the sequence and skips the lost
//! update once `max_hold` runs out.
//!
//! ```text
//! RUST_LOG=debug cargo run --example ordered_webhook
//! ```

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use seedvisor::{Config, HandlerError, HandlerFn, LogWriter, OrderingMode, Runtime, SourceKind, Update};

#[derive(Debug)]
struct Hook {
    id: u64,
    body: String,
}

impl Update for Hook {
    fn seq(&self) -> u64 {
        self.id
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config {
        source: SourceKind::Push,
        ordering: OrderingMode::Enabled,
        max_hold: Duration::from_secs(1),
        ..Config::default()
    };

    let rt = Arc::new(
        Runtime::builder(cfg)
            .handler(HandlerFn::new(|h: Arc<Hook>| async move {
                println!("#{:>2} {}", h.id, h.body);
                Ok::<_, HandlerError>(())
            }))
            .with_subscribers(vec![Arc::new(LogWriter::new())])
            .build()?,
    );

    let token = CancellationToken::new();
    let runner = {
        let rt = Arc::clone(&rt);
        let token = token.clone();
        tokio::spawn(async move { rt.run(token).await })
    };

    // 1..=12 in random order; 7 is lost on the way.
    let mut ids: Vec<u64> = (1..=12).filter(|id| *id != 7).collect();
    ids.shuffle(&mut rand::rng());
    ids.retain(|id| *id != 1);
    ids.insert(0, 1);

    let feed = rt.feed()?;
    for id in ids {
        feed.feed(Hook {
            id,
            body: format!("payload {id}"),
        })?;
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    // late duplicate of an already dispatched update
    feed.feed(Hook {
        id: 3,
        body: "retried delivery".into(),
    })?;

    tokio::time::sleep(Duration::from_secs(2)).await;
    token.cancel();

    match runner.await? {
        Ok(()) => println!("runtime stopped gracefully"),
        Err(e) => println!("runtime stopped with error: {e}"),
    }
    Ok(())
}
