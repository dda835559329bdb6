//! One delegate per chat, asking a question and waiting for the answer.
//!
//! Each chat gets its own long-lived delegate. Follow-up messages of the same chat
//! reach it through a listener, while the dispatcher keeps reusing the live delegate
//! instead of spawning another one. A second pattern keeps one application-wide audit
//! delegate alive.
//!
//! ```text
//! RUST_LOG=debug cargo run --example conversation
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use seedvisor::{
    Config, DelegateError, DelegationPattern, ListenError, LogWriter, Runtime, SeedContext,
    SourceKind, Update, call, call_with, per_application, per_key,
};

#[derive(Debug)]
struct Message {
    id: u64,
    chat: i64,
    text: &'static str,
}

impl Update for Message {
    fn seq(&self) -> u64 {
        self.id
    }
}

async fn greet(ctx: SeedContext<Message>) -> Result<(), DelegateError> {
    let chat = ctx.update.chat;
    let mut listener = ctx.listener().with_idle_timeout(Duration::from_secs(3));
    listener.capture(move |m: &Message| m.chat == chat);

    println!("[chat {chat}] what is your name?");
    let name = match listener.wait().await {
        Ok(m) => m,
        Err(ListenError::Idle { .. }) => {
            println!("[chat {chat}] no answer, giving up");
            return Ok(());
        }
        Err(e) => return Err(DelegateError::failed(e.to_string())),
    };

    println!("[chat {chat}] hello, {}! how old are you?", name.text);
    let age = listener
        .wait()
        .await
        .map_err(|e| DelegateError::failed(e.to_string()))?;
    match age.text.parse::<u32>() {
        Ok(n) => println!("[chat {chat}] {} is {n}", name.text),
        Err(_) => return Err(DelegateError::failed(format!("bad age {:?}", age.text))),
    }
    Ok(())
}

async fn audit(ctx: SeedContext<Message>, prefix: &'static str) -> Result<(), DelegateError> {
    let mut listener = ctx.listener().with_idle_timeout(Duration::from_secs(1));
    listener.capture(|_m: &Message| true);
    let mut seen = 1;
    while listener.wait().await.is_ok() {
        seen += 1;
    }
    println!("{prefix}: {seen} updates");
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Config {
        source: SourceKind::Push,
        ..Config::default()
    };

    let rt = Arc::new(
        Runtime::builder(cfg)
            .delegate(DelegationPattern::new(per_key(|m: &Message| Some(m.chat)), call(greet)))
            .delegate(DelegationPattern::new(per_application(), call_with(audit, "audit")))
            .with_subscribers(vec![Arc::new(LogWriter::new())])
            .build()?,
    );

    let token = CancellationToken::new();
    let runner = {
        let rt = Arc::clone(&rt);
        let token = token.clone();
        tokio::spawn(async move { rt.run(token).await })
    };

    let script = [
        (1, "/start"),
        (2, "/start"),
        (1, "alice"),
        (2, "bob"),
        (1, "31"),
        (2, "many"),
        (3, "/start"),
    ];
    let feed = rt.feed()?;
    for (id, (chat, text)) in (1u64..).zip(script) {
        feed.feed(Message { id, chat, text })?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;
    token.cancel();
    runner.await??;

    if let Err(e) = rt.wait_delegates(Duration::from_secs(5)).await {
        println!("some delegates did not finish: {e}");
    }
    println!("registry: {} entries, {} live", rt.registry().len(), rt.registry().live());
    Ok(())
}
