use std::fmt::Display;

use anyhow::Context;
use colored::Colorize;
use lending_core::{EngineConfig, LendingEngine, LendingResult, LoanFilter};
use lending_server::{LendingServer, ServerConfig};
use lending_store::InMemoryStore;
use lending_types::{ActorId, CatalogId, TenantId};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Config(args) => cmd_config(args),
        Command::Demo(args) => cmd_demo(args),
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    println!(
        "{} Lending server on {} (loan period {} days)",
        "✓".green().bold(),
        config.bind_addr.to_string().bold(),
        config.engine.loan_period_days
    );
    LendingServer::new(config).serve().await?;
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    match args.check {
        Some(path) => {
            let config = ServerConfig::load(&path)?;
            println!("{} {} is valid", "✓".green().bold(), path.display().to_string().bold());
            println!("  bind_addr: {}", config.bind_addr);
            println!("  loan_period_days: {}", config.engine.loan_period_days);
            println!("  shards: {}", config.store.shards);
            println!("  lock_timeout_ms: {}", config.store.lock_timeout_ms);
        }
        None => print!("{}", ServerConfig::default().to_toml_string()?),
    }
    Ok(())
}

fn step<T, F>(label: &str, result: LendingResult<T>, describe: F) -> Option<T>
where
    F: FnOnce(&T) -> String,
{
    match result {
        Ok(value) => {
            println!("  {} {label}: {}", "✓".green(), describe(&value));
            Some(value)
        }
        Err(e) => {
            println!("  {} {label}: {} ({})", "✗".red(), e, e.kind().yellow());
            None
        }
    }
}

fn heading(title: impl Display) {
    println!("\n{}", title.to_string().bold());
}

fn cmd_demo(args: DemoArgs) -> anyhow::Result<()> {
    let engine = LendingEngine::new(InMemoryStore::new(), EngineConfig::default())?;
    let tenant = TenantId::new(1);
    let approver = ActorId::new(1);
    let (alice, bob, carol, dave) = (
        ActorId::new(101),
        ActorId::new(102),
        ActorId::new(103),
        ActorId::new(104),
    );
    let title = CatalogId::new("ISBN-0-306-40615-2")?;

    heading("Stock and first loan");
    step(
        "add stock",
        engine.add_stock(tenant, &title, args.copies),
        |r| format!("{} of {} available", r.available_copies, r.total_copies),
    );
    let borrow = step(
        "alice raises borrow",
        engine.raise_borrow(tenant, alice, &title),
        |r| r.id.to_string(),
    );
    if let Some(req) = &borrow {
        step(
            "approve",
            engine.approve_borrow(tenant, req.id, approver),
            |l| format!("{} due {}", l.id, l.expected_return_at.format("%Y-%m-%d")),
        );
    }

    heading("Duplicate request");
    step(
        "alice raises borrow again",
        engine.raise_borrow(tenant, alice, &title),
        |r| r.id.to_string(),
    );

    heading("Racing for the last copies");
    let bob_req = step("bob raises borrow", engine.raise_borrow(tenant, bob, &title), |r| {
        r.id.to_string()
    });
    let carol_req = step(
        "carol raises borrow",
        engine.raise_borrow(tenant, carol, &title),
        |r| r.id.to_string(),
    );
    for (name, req) in [("bob", bob_req), ("carol", carol_req)] {
        if let Some(req) = req {
            let approved = step(
                &format!("approve {name}"),
                engine.approve_borrow(tenant, req.id, approver),
                |l| l.id.to_string(),
            );
            if approved.is_none() {
                step(
                    &format!("reject {name}"),
                    engine.reject_borrow(tenant, req.id),
                    |r| format!("{} dropped", r.id),
                );
            }
        }
    }
    step("search", engine.search(tenant, &title), |s| match s.expected_available_at {
        Some(at) => format!("none available, next due {}", at.format("%Y-%m-%d")),
        None => format!("{} available", s.available_copies),
    });

    heading("Return");
    let ret = step(
        "alice raises return",
        engine.raise_return(tenant, alice, &title),
        |r| r.id.to_string(),
    );
    if let Some(req) = ret {
        step(
            "complete return",
            engine.complete_return(tenant, req.id, approver),
            |l| format!("{} {}", l.id, l.status),
        );
    }

    heading("Return of a title never borrowed");
    step(
        "dave raises return",
        engine.raise_return(tenant, dave, &title),
        |r| r.id.to_string(),
    );

    heading("Loans");
    for loan in engine.list_loans(tenant, &LoanFilter::default())? {
        println!(
            "  {} {} reader {} {}",
            loan.id.to_string().yellow(),
            loan.catalog,
            loan.requester,
            loan.status.to_string().cyan()
        );
    }
    let stock = engine.availability(tenant, &title)?;
    println!(
        "\n{} {} of {} copies on the shelf, {} pending requests",
        "✓".green().bold(),
        stock.available_copies,
        stock.total_copies,
        engine.list_requests(Some(tenant))?.len()
    );
    Ok(())
}
