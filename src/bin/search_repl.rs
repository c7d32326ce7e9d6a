//! Interactive client for a running search server.
//!
//! Every stdin line is treated as the current contents of a search box and goes through the
//! debouncing orchestrator. Lines starting with `:` are commands:
//!
//! - `:retry` re-sends the last accepted query
//! - `:cancel` drops the in-flight query
//! - `:stats` prints cache and circuit breaker counters
//! - `:clear` empties the result cache
//! - `:reset` closes the circuit breaker
//! - `:quit` exits

use anyhow::Context;
use product_search::client::CircuitBreakerStats;
use product_search::{ClientConfig, SearchClient, SearchEvent, SearchOrchestrator};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("failed to load client configuration")?;
    let client = Arc::new(SearchClient::from_config(&config)?);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SearchEvent>();
    let orchestrator = SearchOrchestrator::new(client.clone(), Arc::new(event_tx), config.orchestrator.clone());

    let (input_tx, input_rx) = mpsc::channel::<String>(64);
    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(input_rx).await })
    };
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    println!("Searching {} ({:?}); type to search, :quit to exit", config.endpoint, config.strategy);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            ":quit" => break,
            ":retry" => orchestrator.retry().await,
            ":cancel" => orchestrator.cancel().await,
            ":clear" => {
                client.cache().clear().await;
                println!("cache cleared");
            }
            ":reset" => {
                client.breaker().reset().await;
                println!("circuit closed");
            }
            ":stats" => {
                let cache = client.cache().stats().await;
                println!(
                    "cache: {} entries, {} hits, {} misses, hit rate {:.2}",
                    cache.size, cache.hits, cache.misses, cache.hit_rate
                );
                print_breaker(&client.breaker().stats().await);
            }
            _ => {
                if input_tx.send(line).await.is_err() {
                    break;
                }
            }
        }
    }

    drop(input_tx);
    runner.await?;
    drop(orchestrator);
    printer.await?;

    Ok(())
}

fn print_event(event: &SearchEvent) {
    match event {
        SearchEvent::Loading { query } => println!("... searching '{}'", query),
        SearchEvent::Result { query, page, degraded } => {
            let marker = if *degraded { " (cached, service degraded)" } else { "" };
            println!(
                "'{}': {} of {} results{}",
                query,
                page.items.len(),
                page.total,
                marker
            );
            for item in &page.items {
                println!(
                    "  {:>12}  {}  {}",
                    item.product_id,
                    item.price.as_deref().unwrap_or("-"),
                    item.title
                );
            }
            if let Some(cursor) = &page.next_cursor {
                println!("  more results after cursor {}", cursor);
            }
        }
        SearchEvent::Error { query, message, retryable } => {
            let hint = if *retryable { " (:retry to try again)" } else { "" };
            println!("'{}' failed: {}{}", query, message, hint);
        }
        SearchEvent::Cleared => println!("(cleared)"),
    }
}

fn print_breaker(stats: &CircuitBreakerStats) {
    println!("circuit: {:?}", stats);
}
