//! Collector binary: wires CLI config, venue sessions, message codecs,
//! the fan-in pipeline, and the opportunity detector together.
//!
//! Init sequence follows the teacher's `main.rs` (`dotenv` search, then
//! `tracing_subscriber::registry()` with an `EnvFilter`); the per-venue
//! connect/read loop follows `scrapers/binance_book_ticker.rs`'s
//! `run_loop`/`connect_and_stream` split (reconnect-with-backoff outer
//! loop, `futures_util::StreamExt` read loop, manual ping handling) but
//! replaces its single hardcoded feed with one task per configured
//! venue, each carrying its own symbol registry and codec. A venue with
//! private credentials additionally gets a second session task against
//! `private_ws_url`, authenticated via `session::auth`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arb_collector::backoff::BackoffController;
use arb_collector::codec::edgex::EdgeXCodec;
use arb_collector::codec::lighter::LighterCodec;
use arb_collector::codec::{Codec, CodecEvent};
use arb_collector::config::{CodecFamily, CollectorConfig, SubscriptionMode, VenueConfig};
use arb_collector::detector::{DetectorConfig, OpportunityDetector};
use arb_collector::health::venue_health;
use arb_collector::metadata_client;
use arb_collector::orderbook::{ApplyOutcome, OrderBookConfig, OrderBookRegistry, PriceLevel};
use arb_collector::pipeline::{AnalysisSignal, FanInPipeline, OrderBookUpdate};
use arb_collector::price_state::PriceStateStore;
use arb_collector::session::auth::{ApiKeyAuth, EphemeralTokenAuth, PrivateAuth};
use arb_collector::session::{HeartbeatAction, SessionConfig, SessionManager, SessionState, TransitionReason};
use arb_collector::symbol::{QuoteAliasPolicy, SymbolRegistry};
use arb_collector::types::VenueId;
use arb_collector::CollectorError;
use clap::Parser;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type HmacSha256 = Hmac<Sha256>;
type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;
type WsRead = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Cross-exchange arbitrage market-data collector")]
struct Cli {
    /// Venue slugs to connect, e.g. "edgex,lighter".
    #[arg(long, env = "ARB_VENUES", value_delimiter = ',', default_value = "edgex,lighter")]
    venues: Vec<String>,

    /// Canonical symbols to track, e.g. "BTC-USDC-PERP,ETH-USDC-PERP".
    #[arg(long, env = "ARB_SYMBOLS", value_delimiter = ',', default_value = "BTC-USDC-PERP")]
    symbols: Vec<String>,

    /// Seconds between health-snapshot log lines.
    #[arg(long, env = "ARB_HEALTH_LOG_INTERVAL_SECS", default_value_t = 30)]
    health_log_interval_secs: u64,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arb_collector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    let _ = dotenv::dotenv();
}

fn codec_family_of(venue: &str) -> CodecFamily {
    if venue.eq_ignore_ascii_case("edgex") {
        CodecFamily::EdgeXLike
    } else {
        CodecFamily::LighterLike
    }
}

fn venue_config_from_env(venue: &str, symbols: &[String]) -> VenueConfig {
    let upper = venue.to_uppercase();
    let env_var = |suffix: &str| std::env::var(format!("{upper}_{suffix}")).ok();

    VenueConfig {
        venue: venue.to_string(),
        codec_family: codec_family_of(venue),
        rest_url: env_var("REST_URL").unwrap_or_default(),
        public_ws_url: env_var("PUBLIC_WS_URL").unwrap_or_default(),
        private_ws_url: env_var("PRIVATE_WS_URL"),
        testnet: env_var("TESTNET").map(|v| v == "true").unwrap_or(false),
        verify_ssl: env_var("VERIFY_SSL").map(|v| v != "false").unwrap_or(true),
        api_key: env_var("API_KEY"),
        api_secret: env_var("API_SECRET"),
        account_index: env_var("ACCOUNT_INDEX").and_then(|v| v.parse().ok()),
        l1_address: env_var("L1_ADDRESS"),
        stark_private_key: env_var("STARK_PRIVATE_KEY"),
        subscription_mode: SubscriptionMode::Predefined {
            symbols: symbols.to_vec(),
            ticker: true,
            orderbook: true,
            trades: false,
            user_data: true,
        },
        use_websocket_balances: env_var("USE_WS_BALANCES").map(|v| v == "true").unwrap_or(true),
        balance_rest_interval_secs: env_var("BALANCE_REST_INTERVAL_SECS").and_then(|v| v.parse().ok()),
        session_overrides: Default::default(),
    }
}

fn build_codec(family: CodecFamily, venue: &str) -> Arc<dyn Codec> {
    match family {
        CodecFamily::EdgeXLike => Arc::new(EdgeXCodec::new(venue)),
        CodecFamily::LighterLike => Arc::new(LighterCodec::new(venue)),
    }
}

/// Builds the credential a venue's private session authenticates with,
/// selecting the shape `VenueConfig::is_authenticated` found (spec.md
/// §4.4 "Authentication"). `None` if neither credential pair is usable.
///
/// The L1-address/stark-key path signs with HMAC-SHA256 rather than the
/// venue's actual STARK-curve signature scheme — reproducing that
/// signer is out of scope here (DESIGN.md Open Question); this still
/// exercises the ephemeral-token refresh path end to end.
fn build_private_auth(venue_cfg: &VenueConfig) -> Option<Box<dyn PrivateAuth>> {
    if let (Some(key), Some(secret)) = (&venue_cfg.api_key, &venue_cfg.api_secret) {
        return Some(Box::new(ApiKeyAuth::new(venue_cfg.venue.clone(), key.clone(), secret.clone())));
    }
    if let (Some(l1_address), Some(stark_key)) = (venue_cfg.l1_address.clone(), venue_cfg.stark_private_key.clone()) {
        let venue = venue_cfg.venue.clone();
        return Some(Box::new(EphemeralTokenAuth::new(venue_cfg.venue.clone(), move || {
            let timestamp_ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            let mut mac = HmacSha256::new_from_slice(stark_key.as_bytes()).map_err(|e| CollectorError::AuthFailed {
                venue: venue.clone(),
                reason: e.to_string(),
            })?;
            mac.update(format!("{l1_address}{timestamp_ms}").as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        })));
    }
    None
}

/// Routes one decoded event to the symbol registry, the fan-in queues,
/// or the backoff controller. Returns `true` if the symbol registry
/// gained entries, telling the caller to refresh its subscribe frames.
fn handle_event(
    event: CodecEvent,
    venue: &str,
    registry: &SymbolRegistry,
    codec: &dyn Codec,
    pipeline: &FanInPipeline,
    backoff: &BackoffController,
) -> bool {
    match event {
        CodecEvent::Ticker(mut ticker) => {
            // Codecs tag the raw contract/market id as the ticker's
            // base leg (quote "UNRESOLVED"); resolve it through the
            // registry before handing it to the analysis worker.
            if let Ok(id) = ticker.symbol.base().parse::<i64>() {
                if let Some(canonical) = registry.symbol_of(id) {
                    ticker.symbol = canonical;
                    pipeline.ticker_queue.push(ticker);
                }
            }
            false
        }
        CodecEvent::OrderBookSnapshot { native_symbol, bids, asks, sequence } => {
            pipeline.orderbook_queue.push(OrderBookUpdate {
                venue: venue.to_string(),
                native_symbol,
                is_snapshot: true,
                bids,
                asks,
                sequence,
            });
            false
        }
        CodecEvent::OrderBookDelta { native_symbol, bids, asks, sequence } => {
            pipeline.orderbook_queue.push(OrderBookUpdate {
                venue: venue.to_string(),
                native_symbol,
                is_snapshot: false,
                bids,
                asks,
                sequence,
            });
            false
        }
        CodecEvent::SymbolMetadata(entries) => {
            registry.replace_from_metadata(&entries);
            for entry in &entries {
                if let (Some(contract_id), Some(price_decimals)) = (entry.contract_id, entry.price_decimals) {
                    codec.configure_market_scale(contract_id, price_decimals);
                }
            }
            info!(venue, count = registry.len(), "symbol registry populated");
            true
        }
        CodecEvent::VenueError { code, message } => {
            warn!(venue, code = %code, message = %message, "venue reported an error");
            backoff.register_error(venue, &code, &message);
            false
        }
        CodecEvent::Trade(trade) => {
            info!(venue, symbol = %trade.symbol, price = trade.price, size = trade.size, side = ?trade.side, "trade fill");
            false
        }
        CodecEvent::Order(order) => {
            debug!(venue, order_id = %order.order_id, status = ?order.status, filled = order.filled, remaining = order.remaining, "order update");
            false
        }
        CodecEvent::Position(position) => {
            info!(venue, symbol = %position.symbol, size = position.size, is_long = position.is_long(), unrealized_pnl = position.unrealized_pnl, "position update");
            false
        }
        CodecEvent::Balance(balance) => {
            debug!(venue, currency = %balance.currency, total = balance.total, free = balance.free, "balance update");
            false
        }
        CodecEvent::Control => false,
    }
}

/// Sends each frame in order with a small inter-send delay (spec.md
/// §4.4 "≈100 ms ... to avoid triggering venue rate limits").
async fn send_frames(write: &mut WsWrite, frames: Vec<String>) -> anyhow::Result<()> {
    for frame in frames {
        write.send(Message::Text(frame)).await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Ok(())
}

/// Shared read/heartbeat loop for both the public and private session
/// (teacher's `connect_and_stream`): returns on any read error or clean
/// close, letting the caller decide the reconnect delay. `sent_frames`
/// is this connection's view of what's already been subscribed; a
/// `SymbolMetadata` event mid-connection triggers sending only the
/// newly-resolved subscribe frames, not a full replay.
#[allow(clippy::too_many_arguments)]
async fn stream_loop(
    mut write: WsWrite,
    mut read: WsRead,
    venue_cfg: &VenueConfig,
    session: &SessionManager,
    registry: &SymbolRegistry,
    codec: &dyn Codec,
    pipeline: &FanInPipeline,
    backoff: &BackoffController,
    heartbeat_interval: Duration,
    mut sent_frames: HashSet<String>,
) -> anyhow::Result<()> {
    let mut heartbeat_ticker = tokio::time::interval(heartbeat_interval);
    heartbeat_ticker.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        session.record_any_message();
                        session.record_business_message();
                        if let Some(pong) = codec.pong_reply(&text) {
                            write.send(Message::Text(pong)).await?;
                        }

                        let mut registry_grew = false;
                        for event in codec.decode(&text) {
                            if handle_event(event, venue_cfg.venue.as_str(), registry, codec, pipeline, backoff) {
                                registry_grew = true;
                            }
                        }

                        if registry_grew {
                            let resolved = registry.resolved_pairs();
                            let fresh: Vec<String> = codec
                                .subscribe_frames(&venue_cfg.subscription_mode, &resolved)
                                .into_iter()
                                .filter(|f| !sent_frames.contains(f))
                                .collect();
                            if !fresh.is_empty() {
                                for f in &fresh {
                                    sent_frames.insert(f.clone());
                                }
                                send_frames(&mut write, fresh).await?;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        session.record_any_message();
                        write.send(Message::Pong(payload)).await?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        session.record_any_message();
                        session.record_pong();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        session.transition(SessionState::Disconnected, TransitionReason::ServerClose);
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                }
            }
            _ = heartbeat_ticker.tick() => {
                match session.check_heartbeat() {
                    HeartbeatAction::Ok => {}
                    HeartbeatAction::SendPing => {
                        session.record_ping_sent();
                        write.send(Message::Ping(Vec::new())).await?;
                    }
                    HeartbeatAction::Silence => {
                        session.transition(SessionState::Error, TransitionReason::Silence);
                        anyhow::bail!("data silence timeout");
                    }
                    HeartbeatAction::PingFailed => {
                        session.transition(SessionState::Error, TransitionReason::PingFailed);
                        anyhow::bail!("heartbeat ping went unanswered");
                    }
                }
            }
        }
    }
}

/// One public-connection connect-and-stream attempt.
async fn connect_and_stream(
    venue_cfg: &VenueConfig,
    session: &SessionManager,
    registry: &SymbolRegistry,
    codec: &dyn Codec,
    pipeline: &FanInPipeline,
    backoff: &BackoffController,
    heartbeat_interval: Duration,
) -> anyhow::Result<()> {
    session.transition(SessionState::Connecting, TransitionReason::Started);
    let (ws_stream, _) = connect_async(&venue_cfg.public_ws_url).await?;
    session.transition(SessionState::Connected, TransitionReason::ConnectSuccess);

    let (mut write, read) = ws_stream.split();

    let resolved = registry.resolved_pairs();
    let initial = codec.subscribe_frames(&venue_cfg.subscription_mode, &resolved);
    let sent: HashSet<String> = initial.iter().cloned().collect();
    send_frames(&mut write, initial).await?;

    stream_loop(write, read, venue_cfg, session, registry, codec, pipeline, backoff, heartbeat_interval, sent).await
}

/// One private-connection connect-and-stream attempt (spec.md §4.4
/// "Owns one or two WebSocket connections"). EdgeX authenticates at the
/// connection level (token in the URL); Lighter attaches its token to
/// each account-channel subscribe frame instead
/// (`Codec::private_subscribe_frames`).
#[allow(clippy::too_many_arguments)]
async fn connect_and_stream_private(
    venue_cfg: &VenueConfig,
    session: &SessionManager,
    registry: &SymbolRegistry,
    codec: &dyn Codec,
    pipeline: &FanInPipeline,
    backoff: &BackoffController,
    heartbeat_interval: Duration,
    auth: &mut dyn PrivateAuth,
) -> anyhow::Result<()> {
    let Some(private_url) = venue_cfg.private_ws_url.as_deref() else {
        anyhow::bail!("venue has no private_ws_url configured");
    };

    session.transition(SessionState::Connecting, TransitionReason::Started);
    let token = match auth.token() {
        Ok(token) => token,
        Err(e) => {
            session.transition(SessionState::Error, TransitionReason::AuthFailed);
            anyhow::bail!("private auth token generation failed: {e}");
        }
    };

    let connect_url = match venue_cfg.codec_family {
        CodecFamily::EdgeXLike => format!("{private_url}?token={token}"),
        CodecFamily::LighterLike => private_url.to_string(),
    };

    let (ws_stream, _) = connect_async(&connect_url).await?;
    session.transition(SessionState::Connected, TransitionReason::ConnectSuccess);
    session.transition(SessionState::Authenticated, TransitionReason::AuthSuccess);

    let (mut write, read) = ws_stream.split();

    let resolved = registry.resolved_pairs();
    let mut initial = codec.subscribe_frames(&venue_cfg.subscription_mode, &resolved);
    initial.extend(codec.private_subscribe_frames(venue_cfg.account_index, &token));
    let sent: HashSet<String> = initial.iter().cloned().collect();
    send_frames(&mut write, initial).await?;

    stream_loop(write, read, venue_cfg, session, registry, codec, pipeline, backoff, heartbeat_interval, sent).await
}

/// Supervises one venue's public connection: reconnects with the
/// session's fixed-then-exponential schedule, pausing instead if the
/// backoff controller has the venue under an error cooldown.
async fn run_venue(
    venue_cfg: VenueConfig,
    session: Arc<SessionManager>,
    registry: Arc<SymbolRegistry>,
    codec: Arc<dyn Codec>,
    pipeline: Arc<FanInPipeline>,
    backoff: Arc<BackoffController>,
) {
    let heartbeat_interval = venue_cfg
        .session_overrides
        .heartbeat_check_interval
        .unwrap_or(SessionConfig::default().heartbeat_check_interval);

    loop {
        if let Some((reason, remaining_secs)) = backoff.pause_info(&venue_cfg.venue) {
            info!(venue = %venue_cfg.venue, reason, remaining_secs, "venue paused, waiting out backoff");
            tokio::time::sleep(Duration::from_secs(remaining_secs)).await;
            continue;
        }

        let result = connect_and_stream(
            &venue_cfg,
            &session,
            &registry,
            codec.as_ref(),
            &pipeline,
            &backoff,
            heartbeat_interval,
        )
        .await;

        if let Err(e) = result {
            warn!(venue = %venue_cfg.venue, error = %e, "venue session ended, reconnecting");
            if session.state() != SessionState::Error {
                session.transition(SessionState::Error, TransitionReason::ConnectFailed);
            }
        }

        let delay = session.next_reconnect_delay();
        tokio::time::sleep(delay).await;
    }
}

/// Supervises one venue's private connection, same reconnect discipline
/// as `run_venue`; a fresh auth token is pulled on every reconnect
/// attempt (spec.md §4.4 "must not cache an expired token across
/// reconnects").
async fn run_private_venue(
    venue_cfg: VenueConfig,
    session: Arc<SessionManager>,
    registry: Arc<SymbolRegistry>,
    codec: Arc<dyn Codec>,
    pipeline: Arc<FanInPipeline>,
    backoff: Arc<BackoffController>,
    mut auth: Box<dyn PrivateAuth>,
) {
    let heartbeat_interval = venue_cfg
        .session_overrides
        .heartbeat_check_interval
        .unwrap_or(SessionConfig::default().heartbeat_check_interval);

    loop {
        if let Some((reason, remaining_secs)) = backoff.pause_info(&venue_cfg.venue) {
            info!(venue = %venue_cfg.venue, reason, remaining_secs, "private venue paused, waiting out backoff");
            tokio::time::sleep(Duration::from_secs(remaining_secs)).await;
            continue;
        }

        let result = connect_and_stream_private(
            &venue_cfg,
            &session,
            &registry,
            codec.as_ref(),
            &pipeline,
            &backoff,
            heartbeat_interval,
            auth.as_mut(),
        )
        .await;

        if let Err(e) = result {
            warn!(venue = %venue_cfg.venue, error = %e, "private venue session ended, reconnecting");
            if session.state() != SessionState::Error {
                session.transition(SessionState::Error, TransitionReason::ConnectFailed);
            }
        }

        let delay = session.next_reconnect_delay();
        tokio::time::sleep(delay).await;
    }
}

/// Drains the order-book queue and applies each update to the shared
/// registry's per-(venue, symbol) book (C3, spec.md §4.3).
async fn run_orderbook_ingest(pipeline: Arc<FanInPipeline>, books: Arc<OrderBookRegistry>) {
    let Some(mut receiver) = pipeline.orderbook_queue.take_receiver() else {
        return;
    };

    while let Some(update) = receiver.recv().await {
        let book = books.book_for(&update.venue, &update.native_symbol);

        let outcome = if update.is_snapshot {
            let bids = update.bids.iter().map(|&(price, size)| PriceLevel { price, size }).collect();
            let asks = update.asks.iter().map(|&(price, size)| PriceLevel { price, size }).collect();
            book.apply_snapshot(bids, asks, update.sequence)
        } else {
            let deltas: Vec<(bool, f64, f64)> = update
                .bids
                .iter()
                .map(|&(price, size)| (true, price, size))
                .chain(update.asks.iter().map(|&(price, size)| (false, price, size)))
                .collect();
            book.apply_delta_batch(&deltas, update.sequence)
        };

        if !matches!(outcome, ApplyOutcome::Applied) {
            debug!(
                venue = %update.venue,
                native_symbol = %update.native_symbol,
                outcome = ?outcome,
                "order book update not applied cleanly"
            );
        }
    }
}

/// Drains the ticker queue into the shared price state store and
/// signals the analysis worker that this symbol has fresh data (C6,
/// spec.md §4.6).
async fn run_ticker_ingest(pipeline: Arc<FanInPipeline>, price_state: Arc<PriceStateStore>) {
    let Some(mut receiver) = pipeline.ticker_queue.take_receiver() else {
        return;
    };

    while let Some(ticker) = receiver.recv().await {
        let symbol = ticker.symbol.clone();
        price_state.update(ticker);
        pipeline.analysis_queue.push(AnalysisSignal { symbol });
    }
}

/// Drains the analysis queue and runs the opportunity detector against
/// the price state store's current cross-venue view for the signaled
/// symbol (the "Analysis Worker" of spec.md §2's control-flow diagram).
async fn run_analysis(pipeline: Arc<FanInPipeline>, price_state: Arc<PriceStateStore>, detector: OpportunityDetector) {
    let Some(mut receiver) = pipeline.analysis_queue.take_receiver() else {
        return;
    };

    while let Some(signal) = receiver.recv().await {
        let tickers = price_state.tickers_for(&signal.symbol);
        if tickers.len() < 2 {
            continue;
        }

        for opp in detector.scan_price_spreads(&signal.symbol, &tickers) {
            info!(
                symbol = %opp.symbol,
                long = %opp.long_venue,
                short = %opp.short_venue,
                spread_bps = opp.spread_bps,
                "price-spread opportunity"
            );
        }
        for opp in detector.scan_funding_spreads(&signal.symbol, &tickers) {
            info!(
                symbol = %opp.symbol,
                long = %opp.long_venue,
                short = %opp.short_venue,
                spread = opp.spread,
                "funding-spread opportunity"
            );
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_env();
    init_tracing();

    let cli = Cli::parse();
    info!(venues = ?cli.venues, symbols = ?cli.symbols, "starting collector");

    let mut config = CollectorConfig::from_env_defaults();
    config.venues = cli.venues.iter().map(|v| venue_config_from_env(v, &cli.symbols)).collect();

    let backoff = Arc::new(BackoffController::new());
    let pipeline = Arc::new(FanInPipeline::new(&config));
    let order_books = Arc::new(OrderBookRegistry::new(OrderBookConfig::default()));
    let price_state = Arc::new(PriceStateStore::new());
    let detector = OpportunityDetector::with_null_score_policy(DetectorConfig::default());
    let http = reqwest::Client::new();

    let mut sessions = Vec::new();
    for venue_cfg in config.venues.clone() {
        let session = Arc::new(SessionManager::new(venue_cfg.venue.clone(), SessionConfig::default()));
        let registry = Arc::new(SymbolRegistry::new(
            VenueId::new(venue_cfg.venue.clone()),
            QuoteAliasPolicy::usdc_settled(),
        ));
        let codec = build_codec(venue_cfg.codec_family, &venue_cfg.venue);

        // Optional one-shot REST bootstrap so the registry is populated
        // before the first WS metadata frame arrives; the WS frame
        // remains authoritative and replaces whatever this seeds.
        if !venue_cfg.rest_url.is_empty() {
            match metadata_client::fetch_contract_metadata(&http, &venue_cfg.venue, &venue_cfg.rest_url).await {
                Ok(entries) if !entries.is_empty() => {
                    registry.replace_from_metadata(&entries);
                    for entry in &entries {
                        if let (Some(contract_id), Some(price_decimals)) = (entry.contract_id, entry.price_decimals) {
                            codec.configure_market_scale(contract_id, price_decimals);
                        }
                    }
                    info!(venue = %venue_cfg.venue, count = entries.len(), "contract metadata bootstrapped via REST");
                }
                Ok(_) => {}
                Err(err) => warn!(
                    venue = %venue_cfg.venue,
                    error = %err,
                    "REST contract metadata bootstrap failed; relying on WS metadata frame"
                ),
            }
        }

        sessions.push(session.clone());
        tokio::spawn(run_venue(
            venue_cfg.clone(),
            session.clone(),
            registry.clone(),
            codec.clone(),
            pipeline.clone(),
            backoff.clone(),
        ));

        if venue_cfg.private_ws_url.is_some() && venue_cfg.is_authenticated() {
            match build_private_auth(&venue_cfg) {
                Some(auth) => {
                    tokio::spawn(run_private_venue(
                        venue_cfg.clone(),
                        session.clone(),
                        registry.clone(),
                        codec.clone(),
                        pipeline.clone(),
                        backoff.clone(),
                        auth,
                    ));
                }
                None => warn!(venue = %venue_cfg.venue, "authenticated venue has no usable credential pair, skipping private session"),
            }
        }
    }

    tokio::spawn(run_orderbook_ingest(pipeline.clone(), order_books.clone()));
    tokio::spawn(run_ticker_ingest(pipeline.clone(), price_state.clone()));
    tokio::spawn(run_analysis(pipeline.clone(), price_state.clone(), detector));

    let health_interval = Duration::from_secs(cli.health_log_interval_secs);
    loop {
        for session in &sessions {
            let health = venue_health(session, &backoff);
            info!(
                venue = %health.venue,
                state = %health.state,
                connects = health.connect_successes,
                reconnects = health.reconnects,
                paused = health.backoff_paused,
                "venue health"
            );
        }
        tokio::time::sleep(health_interval).await;
    }
}
