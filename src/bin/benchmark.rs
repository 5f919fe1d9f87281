//! Cold vs. cached query latency against a running Sluice server.
//!
//! Usage: benchmark [rows] [iterations]

use rand::Rng;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

const EVENTS: &[&str] = &["click", "view", "purchase", "scroll", "hover", "submit", "load", "error"];
const PAGES: &[&str] = &["/home", "/products", "/checkout", "/about", "/pricing", "/docs", "/dashboard"];
const COUNTRIES: &[&str] = &["US", "UK", "CA", "DE", "FR", "JP", "AU", "BR", "IN", "MX"];

const QUERIES: &[&str] = &[
    "SELECT * FROM bench_events",
    "SELECT event, page FROM bench_events",
    "SELECT user_id, latency_ms FROM bench_events LIMIT 500",
    "SELECT country FROM bench_events LIMIT 100",
];

fn generate_rows(count: usize) -> Value {
    let mut rng = rand::thread_rng();
    let now = chrono::Utc::now().timestamp_millis();

    let rows: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "timestamp": now - (i as i64) * 100 - rng.gen_range(0..100),
                "event": EVENTS[rng.gen_range(0..EVENTS.len())],
                "page": PAGES[rng.gen_range(0..PAGES.len())],
                "user_id": 1000 + i,
                "latency_ms": rng.gen_range(20..500),
                "country": COUNTRIES[rng.gen_range(0..COUNTRIES.len())]
            })
        })
        .collect();

    json!({ "rows": rows })
}

struct LatencyStats {
    samples: Vec<Duration>,
}

impl LatencyStats {
    fn avg(&self) -> Duration {
        let sum: Duration = self.samples.iter().sum();
        sum / self.samples.len().max(1) as u32
    }

    fn percentile(&self, p: usize) -> Duration {
        let mut sorted = self.samples.clone();
        sorted.sort();
        sorted
            .get(sorted.len() * p / 100)
            .or(sorted.last())
            .copied()
            .unwrap_or_default()
    }
}

async fn timed_query(
    client: &Client,
    base_url: &str,
    sql: &str,
) -> Result<(Duration, bool), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let response = client
        .post(format!("{}/query", base_url))
        .json(&json!({ "sql": sql }))
        .send()
        .await?;
    let elapsed = start.elapsed();

    if !response.status().is_success() {
        return Err(response.text().await?.into());
    }
    let body: Value = response.json().await?;
    Ok((elapsed, body["from_cache"].as_bool().unwrap_or(false)))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    let rows: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(50_000);
    let iterations: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(20);
    let host = std::env::var("SLUICE_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("SLUICE_PORT").unwrap_or_else(|_| "8080".to_string());
    let base_url = format!("http://{}:{}", host, port);

    println!("Sluice Benchmark");
    println!("================");
    println!("Target:      {}", base_url);
    println!("Rows:        {}", rows);
    println!("Iterations:  {} (per query)", iterations);
    println!();

    let client = Client::new();

    print!("Loading bench_events... ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let start = Instant::now();
    let response = client
        .post(format!("{}/tables/bench_events", base_url))
        .json(&generate_rows(rows))
        .send()
        .await?;
    if !response.status().is_success() {
        eprintln!("Error: {}", response.text().await?);
        return Ok(());
    }
    println!("done in {:?}", start.elapsed());
    println!();

    for sql in QUERIES {
        println!("{}", sql);

        // Cold: cache disabled per request
        let mut cold = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            let start = Instant::now();
            let response = client
                .post(format!("{}/query", base_url))
                .json(&json!({ "sql": sql, "use_cache": false }))
                .send()
                .await?;
            if !response.status().is_success() {
                eprintln!("Error: {}", response.text().await?);
                return Ok(());
            }
            cold.push(start.elapsed());
        }

        // Prime, then measure hits
        timed_query(&client, &base_url, sql).await?;
        let mut cached = Vec::with_capacity(iterations);
        let mut hits = 0;
        for _ in 0..iterations {
            let (elapsed, from_cache) = timed_query(&client, &base_url, sql).await?;
            cached.push(elapsed);
            hits += from_cache as usize;
        }

        let cold = LatencyStats { samples: cold };
        let cached = LatencyStats { samples: cached };
        println!(
            "  Cold:    avg={:?} p50={:?} p99={:?}",
            cold.avg(),
            cold.percentile(50),
            cold.percentile(99)
        );
        println!(
            "  Cached:  avg={:?} p50={:?} p99={:?} ({}/{} hits)",
            cached.avg(),
            cached.percentile(50),
            cached.percentile(99),
            hits,
            iterations
        );
        println!();
    }

    println!("Server Statistics:");
    let stats: Value = client
        .get(format!("{}/stats", base_url))
        .send()
        .await?
        .json()
        .await?;

    let cache = &stats["cache"];
    println!(
        "  Cache:   {} entries, {:.2} MB, hit rate {:.1}%, {} evictions",
        cache["entry_count"],
        cache["memory_usage_mb"].as_f64().unwrap_or(0.0),
        cache["hit_rate"].as_f64().unwrap_or(0.0) * 100.0,
        cache["evictions"]
    );
    let queries = &stats["queries"];
    println!(
        "  Queries: {} executed, {} slow, avg {:.4}s, {} rows fetched",
        queries["total_queries"],
        queries["slow_queries"],
        queries["avg_execution_time_seconds"].as_f64().unwrap_or(0.0),
        queries["total_rows_fetched"]
    );

    Ok(())
}
