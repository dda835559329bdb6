//! Long polling against a simulated remote, with routing by flavor.
//!
//! The simulated remote drops every fourth fetch and reports itself unavailable once,
//! so the retry path shows up in the logs.
//!
//! ```text
//! RUST_LOG=debug cargo run --example polling
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use seedvisor::{
    BackoffPolicy, Config, Flavor, HandlerError, HandlerFn, JitterPolicy, LogWriter, Runtime,
    RoutingTable, Transport, TransportError, Update,
};

#[derive(Debug)]
enum Kind {
    Text(String),
    Button(&'static str),
}

#[derive(Debug)]
struct Incoming {
    id: u64,
    chat: i64,
    kind: Kind,
}

impl Update for Incoming {
    fn seq(&self) -> u64 {
        self.id
    }
}

/// Produces two updates per fetch and fails now and then.
struct Simulated {
    calls: AtomicU32,
}

#[async_trait]
impl Transport<Incoming> for Simulated {
    async fn fetch(
        &self,
        after: Option<u64>,
        _timeout: Option<Duration>,
    ) -> Result<Vec<Incoming>, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        tokio::time::sleep(Duration::from_millis(50)).await;
        match call {
            5 => return Err(TransportError::Unavailable { status: 502 }),
            n if n % 4 == 0 => return Err(TransportError::Io("connection reset".into())),
            _ => {}
        }

        let next = after.map_or(1, |c| c + 1);
        Ok(vec![
            Incoming {
                id: next,
                chat: (next % 3) as i64,
                kind: Kind::Text(format!("message #{next}")),
            },
            Incoming {
                id: next + 1,
                chat: 1,
                kind: Kind::Button("like"),
            },
        ])
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config {
        interval: Duration::from_millis(200),
        timeout: Duration::from_secs(1),
        unavailable_delay: Duration::from_secs(2),
        retry: BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        },
        ..Config::default()
    };

    let table = RoutingTable::new()
        .route(
            Flavor::Chat,
            HandlerFn::new(|u: Arc<Incoming>| async move {
                if let Kind::Text(text) = &u.kind {
                    println!("[chat {}] {text}", u.chat);
                }
                Ok::<_, HandlerError>(())
            }),
        )
        .route(
            Flavor::CallbackQuery,
            HandlerFn::new(|u: Arc<Incoming>| async move {
                match u.kind {
                    Kind::Button(data) if u.id % 10 == 0 => {
                        Err(HandlerError::new(format!("button {data} rejected")))
                    }
                    Kind::Button(data) => {
                        println!("[chat {}] pressed {data}", u.chat);
                        Ok(())
                    }
                    Kind::Text(_) => Ok(()),
                }
            }),
        );

    let rt = Runtime::builder(cfg)
        .routing(
            |u: &Incoming| match u.kind {
                Kind::Text(_) => Flavor::Chat,
                Kind::Button(_) => Flavor::CallbackQuery,
            },
            table,
        )
        .with_transport(Simulated {
            calls: AtomicU32::new(0),
        })
        .with_subscribers(vec![Arc::new(LogWriter::new())])
        .build()?;

    let token = CancellationToken::new();
    let stop = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(6)).await;
        stop.cancel();
    });

    match rt.run(token).await {
        Ok(()) => println!("runtime stopped gracefully"),
        Err(e) => println!("runtime stopped with error: {e}"),
    }
    Ok(())
}
