use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use mx_storefront::{
    checkout::{Cart, CheckoutDeps, CheckoutFlow, CheckoutState, PaymentConfirmer, ProcessorConfirmer},
    config::{self, AppConfig},
    errors::ServiceError,
    export::{self, ExportKind},
    functions::{self, Function, FunctionRequest},
    handlers::promo::load_promo_book,
    models::{Customer, OrderItem, PaymentMethod},
    notifications::OrderNotifier,
    payments::{PaymentIntentService, StripePaymentProcessor},
    store::TieredStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    match cli.command {
        Commands::Invoke(args) => handle_invoke(&cfg, args).await?,
        Commands::PlaceOrder(args) => handle_place_order(&cfg, args, cli.json).await?,
        Commands::Export(args) => handle_export(&cfg, args).await?,
        Commands::Promo(args) => handle_promo(&cfg, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "storefront-cli", about = "Storefront functions, test checkouts and exports", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one stateless function against a JSON request envelope
    Invoke(InvokeArgs),
    /// Drive a full checkout, card or cash on delivery
    PlaceOrder(PlaceOrderArgs),
    /// Write the orders or messages CSV
    Export(ExportArgs),
    /// Resolve a promo code
    Promo(PromoArgs),
}

#[derive(Args)]
struct InvokeArgs {
    #[arg(value_enum)]
    function: Function,
    #[arg(long, help = "Request envelope file; stdin when omitted")]
    request: Option<PathBuf>,
}

#[derive(Args)]
struct PlaceOrderArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    email: String,
    #[arg(long)]
    phone: String,
    #[arg(long)]
    city: String,
    #[arg(long)]
    street: String,
    #[arg(long)]
    zip: String,
    #[arg(
        long = "item",
        required = true,
        value_parser = parse_item,
        help = "Cart line as id:name:qty:price, repeatable"
    )]
    items: Vec<OrderItem>,
    #[arg(long)]
    promo: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, help = "Pay cash on delivery")]
    cod: bool,
    #[arg(
        long,
        default_value = "pm_card_visa",
        help = "Payment method used to confirm card payments"
    )]
    payment_method: String,
}

#[derive(Args)]
struct ExportArgs {
    #[arg(long, action = ArgAction::SetTrue, help = "Export messages instead of orders")]
    messages: bool,
    #[arg(long, help = "Output file; defaults to the dated file name")]
    out: Option<PathBuf>,
}

#[derive(Args)]
struct PromoArgs {
    code: String,
    #[arg(long)]
    subtotal: Option<Decimal>,
}

fn parse_item(raw: &str) -> Result<OrderItem, String> {
    let parts: Vec<&str> = raw.splitn(4, ':').collect();
    let [id, name, qty, price] = parts.as_slice() else {
        return Err(format!("expected id:name:qty:price, got '{}'", raw));
    };
    Ok(OrderItem {
        id: id.trim().to_string(),
        name: name.trim().to_string(),
        qty: qty
            .trim()
            .parse()
            .map_err(|e| format!("invalid quantity '{}': {}", qty, e))?,
        price: Decimal::from_str(price.trim())
            .map_err(|e| format!("invalid price '{}': {}", price, e))?,
    })
}

async fn handle_invoke(cfg: &AppConfig, args: InvokeArgs) -> Result<()> {
    let raw = match &args.request {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read request from stdin")?;
            buf
        }
    };
    let request: FunctionRequest =
        serde_json::from_str(&raw).context("request envelope is not valid JSON")?;

    let response = functions::invoke(args.function, cfg, request).await;
    print_json(&response)?;
    if response.status >= 400 {
        bail!("function answered {}", response.status);
    }
    Ok(())
}

/// Payment confirmation when no processor is configured.
struct UnavailableConfirmer;

#[async_trait]
impl PaymentConfirmer for UnavailableConfirmer {
    async fn confirm(&self, _client_secret: &str) -> Result<(), ServiceError> {
        Err(ServiceError::not_configured("stripe_secret_key is not set"))
    }
}

async fn handle_place_order(cfg: &AppConfig, args: PlaceOrderArgs, json: bool) -> Result<()> {
    let store = TieredStore::from_config(cfg)?;
    let confirmer: Arc<dyn PaymentConfirmer> = match StripePaymentProcessor::from_config(cfg) {
        Ok(processor) => Arc::new(ProcessorConfirmer::new(processor, args.payment_method.clone())),
        Err(ServiceError::NotConfigured(_)) => Arc::new(UnavailableConfirmer),
        Err(e) => return Err(e.into()),
    };
    let deps = CheckoutDeps {
        intents: Arc::new(PaymentIntentService::from_config(cfg)?),
        confirmer,
        notifier: Some(OrderNotifier::from_config(cfg, store.clone())),
        currency: cfg.default_currency.clone(),
        cod_delay: cfg.cod_processing_delay(),
    };

    let mut flow = CheckoutFlow::new(deps, Cart::new(args.items));
    if let Some(code) = args.promo.as_deref() {
        let book = load_promo_book(&store).await;
        let totals = flow.cart_mut()?.apply_promo(&book, code, Utc::now())?;
        debug!(discount = %totals.discount, "Promo code applied");
    }
    flow.fill_customer(Customer {
        name: args.name,
        email: args.email,
        phone: args.phone,
        city: args.city,
        street: args.street,
        zip: args.zip,
    })?;
    flow.select_payment_method(if args.cod {
        PaymentMethod::Cod
    } else {
        PaymentMethod::Card
    })?;

    flow.complete().await?;
    let order = match flow.state() {
        CheckoutState::Success { order } => order.clone(),
        CheckoutState::Failure(failure) if failure.retryable => {
            bail!("checkout failed ({}): {}; correct it and run again", failure.code, failure.message)
        }
        CheckoutState::Failure(failure) => {
            bail!("checkout failed ({}): {}", failure.code, failure.message)
        }
        other => bail!("checkout stopped in state {}", other.name()),
    };

    let outcome = match flow.take_notification() {
        Some(handle) => Some(handle.await.map_err(|e| anyhow!("notification task failed: {}", e))?),
        None => None,
    };

    if json {
        #[derive(Serialize)]
        struct Placed<'a> {
            order: &'a mx_storefront::models::Order,
            delivery: Option<mx_storefront::models::DeliveryOutcome>,
        }
        print_json(&Placed {
            order: &order,
            delivery: outcome,
        })?;
    } else {
        println!(
            "Order {} placed ({}, total {})",
            order.order_number, order.payment_method, order.total
        );
        if let Some(outcome) = outcome {
            println!(
                "Stored: {}  Notified: {}",
                yes_no(outcome.persisted),
                yes_no(outcome.notified)
            );
        }
    }
    Ok(())
}

async fn handle_export(cfg: &AppConfig, args: ExportArgs) -> Result<()> {
    let store = TieredStore::from_config(cfg)?;
    let kind = if args.messages {
        ExportKind::Messages
    } else {
        ExportKind::Orders
    };
    let csv = export::export(&store, kind).await;
    let path = args.out.unwrap_or_else(|| PathBuf::from(&csv.file_name));
    fs::write(&path, csv.content.as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote {} rows to {}", csv.rows, path.display());
    Ok(())
}

async fn handle_promo(cfg: &AppConfig, args: PromoArgs, json: bool) -> Result<()> {
    let store = TieredStore::from_config(cfg)?;
    let book = load_promo_book(&store).await;
    let promo = book.lookup(&args.code, Utc::now())?;

    if json {
        print_json(promo)?;
        return Ok(());
    }
    println!("{}: {}% off", promo.code, promo.percent);
    match promo.expires_at() {
        Some(at) => println!("Expires {}", at.to_rfc3339()),
        None => println!("No expiry"),
    }
    if let Some(subtotal) = args.subtotal {
        let discount = promo
            .discount_for(subtotal)
            .with_context(|| format!("subtotal {} is too large to price", subtotal))?;
        println!("Discount {} on {}, total {}", discount, subtotal, subtotal - discount);
    }
    Ok(())
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
