// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Demo session: a reference host, the `logger` module, a few threads logging
//! through it and one background job completing on the main thread.

use std::path::PathBuf;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use hostloop::host::load_module;
use hostloop::{BridgeConfig, EventLoop, HostValue, LocalHost};

#[derive(Parser)]
#[command(name = "hostloop-logger")]
#[command(author, version, about = "Log to a host console from many threads", long_about = None)]
struct Args {
    /// Threads writing through the logger module
    #[arg(short, long, default_value_t = 4)]
    threads: usize,

    /// Messages per thread
    #[arg(short, long, default_value_t = 3)]
    messages: usize,

    /// Directory containing hostloop.yaml
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Number to square on the worker pool
    #[arg(long, default_value_t = 5)]
    square: i64,
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn load_config(args: &Args) -> Result<BridgeConfig> {
    let config = match &args.config_dir {
        Some(dir) => BridgeConfig::load(dir)
            .with_context(|| format!("loading config from {}", dir.display()))?,
        None => BridgeConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let config = load_config(&args)?;
    let host = LocalHost::new();
    let mut event_loop = EventLoop::builder()
        .config(config)
        .host(host.clone())
        .build()?;
    let bridge = event_loop.handle();

    let logger = load_module(hostloop_logger::MODULE_NAME, &bridge)
        .ok_or_else(|| anyhow!("module '{}' is not registered", hostloop_logger::MODULE_NAME))?;

    let writers: Vec<_> = (0..args.threads)
        .map(|t| {
            let logger = logger.clone();
            let messages = args.messages;
            thread::Builder::new()
                .name(format!("writer-{}", t))
                .spawn(move || -> Result<()> {
                    for i in 0..messages {
                        logger.call("log", &[format!("writer {} message {}", t, i).into()])?;
                    }
                    Ok(())
                })
                .context("spawning writer thread")
        })
        .collect::<Result<_>>()?;

    let done = host.register_function("squareDone", |args, _context| {
        match args {
            [HostValue::Null, value] => tracing::info!("square finished: {}", value),
            [err, ..] => tracing::warn!("square failed: {}", err),
            [] => tracing::warn!("square finished without a result"),
        }
        Ok(HostValue::Undefined)
    });
    bridge.schedule(
        args.square,
        |work| {
            let n = *work.input();
            match n.checked_mul(n) {
                Some(squared) => work.set_result(squared),
                None => work.set_error(1, format!("{} squared overflows", n)),
            }
        },
        |done| {
            let result = done.take_result().map(HostValue::from);
            done.set_node_style_args(result);
        },
        Some(done),
    )?;

    for writer in writers {
        writer
            .join()
            .map_err(|_| anyhow!("writer thread panicked"))??;
    }

    event_loop.run_until_drained()?;
    logger.call("info", &["demo session drained".into()])?;

    tracing::info!(
        "{} console line(s) written, {} lease(s) active",
        host.console_output().len(),
        host.active_leases()
    );
    Ok(())
}
