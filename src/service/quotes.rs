use crate::models::config::ImporterConfig;
use crate::models::error::{BackupError, Result};
use crate::models::quote_row::{InstrumentKind, QuoteRow};
use chrono::{Local, NaiveDateTime};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const TOO_MANY_REQUESTS: u16 = 429;
const OK: u16 = 200;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

/// Minimal HTTP GET seam so the importer can run against canned responses
pub trait Transport {
    /// Status code and body of a GET request
    fn get(&self, url: &str) -> std::result::Result<(u16, String), TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("RustyZipBackUp/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str) -> std::result::Result<(u16, String), TransportError> {
        // The URL may carry the API token, so it never reaches the message
        let to_error = |e: reqwest::Error| {
            let e = e.without_url();
            if e.is_timeout() {
                TransportError::Timeout(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        };
        let response = self.client.get(url).send().map_err(to_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(to_error)?;
        Ok((status, body))
    }
}

/// Retries rate limiting (429) and timeouts with a fixed backoff; any other
/// failure abandons the request at once.
pub struct Fetcher<T: Transport> {
    transport: T,
    max_attempts: usize,
    backoff: Duration,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, max_attempts: usize, backoff: Duration) -> Self {
        Self {
            transport,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// `label` names the request in logs and errors; the URL may carry a token
    pub fn fetch<R: DeserializeOwned>(&self, label: &str, url: &str) -> Result<R> {
        let mut attempt = 1;
        loop {
            let reason = match self.transport.get(url) {
                Ok((OK, body)) => {
                    return serde_json::from_str(&body).map_err(|e| {
                        BackupError::UnexpectedResponse {
                            url: label.to_string(),
                            reason: e.to_string(),
                        }
                    })
                }
                Ok((TOO_MANY_REQUESTS, _)) => "rate limited (HTTP 429)".to_string(),
                Err(TransportError::Timeout(e)) => format!("timed out ({})", e),
                Ok((status, _)) => {
                    return Err(BackupError::RequestAbandoned {
                        url: label.to_string(),
                        reason: format!("HTTP {}", status),
                    })
                }
                Err(TransportError::Other(e)) => {
                    return Err(BackupError::RequestAbandoned {
                        url: label.to_string(),
                        reason: e,
                    })
                }
            };

            if attempt >= self.max_attempts {
                return Err(BackupError::RequestAbandoned {
                    url: label.to_string(),
                    reason: format!("{} after {} attempts", reason, attempt),
                });
            }
            warn!(
                "{}: {}, retrying in {}s (attempt {}/{})",
                label,
                reason,
                self.backoff.as_secs(),
                attempt,
                self.max_attempts
            );
            thread::sleep(self.backoff);
            attempt += 1;
        }
    }
}

#[derive(Deserialize, Debug)]
struct StockResponse {
    results: Vec<StockQuote>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StockQuote {
    symbol: String,
    long_name: String,
    regular_market_price: f64,
    regular_market_change_percent: f64,
    dividend_yield: Option<f64>,
    regular_market_volume: Option<f64>,
}

/// Binance sends its numbers as strings
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CryptoTicker {
    symbol: String,
    last_price: String,
    price_change_percent: String,
    volume: String,
}

fn map_stock(response: StockResponse, updated_at: NaiveDateTime) -> Option<QuoteRow> {
    let quote = response.results.into_iter().next()?;
    Some(QuoteRow {
        code: quote.symbol,
        name: quote.long_name.clone(),
        kind: InstrumentKind::Stock,
        exchange: "B3".to_string(),
        currency: "BRL".to_string(),
        price: quote.regular_market_price,
        day_change: Some(quote.regular_market_change_percent),
        change_12m: None,
        dividend_yield: quote.dividend_yield,
        assets_under_management: None,
        average_volume: quote.regular_market_volume,
        risk: None,
        issuer: Some(quote.long_name),
        maturity: None,
        return_rate: None,
        updated_at,
    })
}

fn map_crypto(ticker: CryptoTicker, updated_at: NaiveDateTime) -> Option<QuoteRow> {
    let price = ticker.last_price.parse().ok()?;
    let day_change = ticker.price_change_percent.parse().ok()?;
    let volume = ticker.volume.parse().ok()?;
    Some(QuoteRow {
        code: ticker.symbol.clone(),
        name: ticker.symbol,
        kind: InstrumentKind::Crypto,
        exchange: "BINANCE".to_string(),
        currency: "BRL".to_string(),
        price,
        day_change: Some(day_change),
        change_12m: None,
        dividend_yield: None,
        assets_under_management: None,
        average_volume: Some(volume),
        risk: Some("ALTO".to_string()),
        issuer: Some("BINANCE".to_string()),
        maturity: None,
        return_rate: None,
        updated_at,
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: Vec<String>,
    pub abandoned: Vec<String>,
}

pub struct QuoteImporter<T: Transport> {
    fetcher: Fetcher<T>,
    stock_base_url: String,
    stock_api_token: Option<String>,
    crypto_base_url: String,
}

impl QuoteImporter<ReqwestTransport> {
    pub fn from_config(config: &ImporterConfig) -> Result<Self> {
        let transport =
            ReqwestTransport::new(Duration::from_secs(config.request_timeout_seconds))?;
        Ok(Self::new(transport, config))
    }
}

impl<T: Transport> QuoteImporter<T> {
    pub fn new(transport: T, config: &ImporterConfig) -> Self {
        Self {
            fetcher: Fetcher::new(
                transport,
                config.max_attempts,
                Duration::from_secs(config.retry_backoff_seconds),
            ),
            stock_base_url: config.stock_base_url.trim_end_matches('/').to_string(),
            stock_api_token: config.stock_api_token.clone(),
            crypto_base_url: config.crypto_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn stock_url(&self, code: &str) -> String {
        match &self.stock_api_token {
            Some(token) => format!(
                "{}/api/quote/{}?token={}",
                self.stock_base_url, code, token
            ),
            None => format!("{}/api/quote/{}", self.stock_base_url, code),
        }
    }

    fn crypto_url(&self, symbol: &str) -> String {
        format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.crypto_base_url, symbol
        )
    }

    pub fn fetch_stock(&self, code: &str) -> Result<QuoteRow> {
        let response: StockResponse = self.fetcher.fetch(code, &self.stock_url(code))?;
        map_stock(response, Local::now().naive_local()).ok_or_else(|| {
            BackupError::UnexpectedResponse {
                url: code.to_string(),
                reason: "no results in response".to_string(),
            }
        })
    }

    pub fn fetch_crypto(&self, symbol: &str) -> Result<QuoteRow> {
        let ticker: CryptoTicker = self.fetcher.fetch(symbol, &self.crypto_url(symbol))?;
        map_crypto(ticker, Local::now().naive_local()).ok_or_else(|| {
            BackupError::UnexpectedResponse {
                url: symbol.to_string(),
                reason: "non-numeric price, change or volume".to_string(),
            }
        })
    }

    /// Imports every stock, then every crypto. A failed item is logged and
    /// skipped; the rest of the batch still runs.
    pub fn import_all<F>(&self, stocks: &[String], cryptos: &[String], mut store: F) -> ImportSummary
    where
        F: FnMut(&QuoteRow) -> Result<()>,
    {
        let mut summary = ImportSummary::default();
        let items = stocks
            .iter()
            .map(|code| (code, self.fetch_stock(code)))
            .chain(cryptos.iter().map(|symbol| (symbol, self.fetch_crypto(symbol))));

        for (code, quote) in items {
            match quote.and_then(|quote| store(&quote).map(|_| quote)) {
                Ok(quote) => {
                    debug!("Imported {} at {}", quote.code, quote.price);
                    summary.imported.push(code.clone());
                }
                Err(e) => {
                    warn!("Skipping {}: {}", code, e);
                    summary.abandoned.push(code.clone());
                }
            }
        }

        info!(
            "Quote import finished: {} imported, {} abandoned",
            summary.imported.len(),
            summary.abandoned.len()
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    type Reply = std::result::Result<(u16, String), TransportError>;

    /// Replies from a per-URL script; unscripted URLs answer 404
    #[derive(Default)]
    struct ScriptedTransport {
        replies: RefCell<HashMap<String, VecDeque<Reply>>>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedTransport {
        fn reply(self, url: &str, reply: Reply) -> Self {
            self.replies
                .borrow_mut()
                .entry(url.to_string())
                .or_default()
                .push_back(reply);
            self
        }

        fn calls_to(&self, url: &str) -> usize {
            self.calls.borrow().iter().filter(|u| *u == url).count()
        }
    }

    impl Transport for &ScriptedTransport {
        fn get(&self, url: &str) -> Reply {
            self.calls.borrow_mut().push(url.to_string());
            self.replies
                .borrow_mut()
                .get_mut(url)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| Ok((404, String::new())))
        }
    }

    const PETR4: &str = r#"{"results":[{"symbol":"PETR4","longName":"Petroleo Brasileiro S.A. - Petrobras",
        "regularMarketPrice":38.45,"regularMarketChangePercent":1.23,"dividendYield":12.4,
        "regularMarketVolume":41250300}]}"#;

    const VALE3: &str = r#"{"results":[{"symbol":"VALE3","longName":"Vale S.A.",
        "regularMarketPrice":61.02,"regularMarketChangePercent":-0.4}]}"#;

    const BTCBRL: &str = r#"{"symbol":"BTCBRL","lastPrice":"352100.00000000",
        "priceChangePercent":"-2.150","volume":"85.32100000"}"#;

    fn config() -> ImporterConfig {
        ImporterConfig {
            stock_base_url: "https://stocks.test/".to_string(),
            stock_api_token: Some("secret".to_string()),
            crypto_base_url: "https://crypto.test".to_string(),
            max_attempts: 3,
            retry_backoff_seconds: 0,
            ..ImporterConfig::default()
        }
    }

    fn stock_url(code: &str) -> String {
        format!("https://stocks.test/api/quote/{}?token=secret", code)
    }

    fn crypto_url(symbol: &str) -> String {
        format!("https://crypto.test/api/v3/ticker/24hr?symbol={}", symbol)
    }

    fn codes(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_maps_stock_quote() {
        let transport = ScriptedTransport::default().reply(&stock_url("PETR4"), Ok((200, PETR4.into())));
        let importer = QuoteImporter::new(&transport, &config());

        let quote = importer.fetch_stock("PETR4").unwrap();

        assert_eq!(quote.code, "PETR4");
        assert_eq!(quote.name, "Petroleo Brasileiro S.A. - Petrobras");
        assert_eq!(quote.kind, InstrumentKind::Stock);
        assert_eq!(quote.exchange, "B3");
        assert_eq!(quote.currency, "BRL");
        assert_eq!(quote.price, 38.45);
        assert_eq!(quote.day_change, Some(1.23));
        assert_eq!(quote.dividend_yield, Some(12.4));
        assert_eq!(quote.average_volume, Some(41_250_300.0));
        assert_eq!(quote.issuer.as_deref(), Some("Petroleo Brasileiro S.A. - Petrobras"));
        assert_eq!(quote.risk, None);
    }

    #[test]
    fn test_stock_optional_fields_may_be_missing() {
        let transport = ScriptedTransport::default().reply(&stock_url("VALE3"), Ok((200, VALE3.into())));
        let importer = QuoteImporter::new(&transport, &config());

        let quote = importer.fetch_stock("VALE3").unwrap();

        assert_eq!(quote.dividend_yield, None);
        assert_eq!(quote.average_volume, None);
    }

    #[test]
    fn test_maps_crypto_ticker() {
        let transport = ScriptedTransport::default().reply(&crypto_url("BTCBRL"), Ok((200, BTCBRL.into())));
        let importer = QuoteImporter::new(&transport, &config());

        let quote = importer.fetch_crypto("BTCBRL").unwrap();

        assert_eq!(quote.code, "BTCBRL");
        assert_eq!(quote.name, "BTCBRL");
        assert_eq!(quote.kind, InstrumentKind::Crypto);
        assert_eq!(quote.exchange, "BINANCE");
        assert_eq!(quote.price, 352100.0);
        assert_eq!(quote.day_change, Some(-2.15));
        assert_eq!(quote.average_volume, Some(85.321));
        assert_eq!(quote.risk.as_deref(), Some("ALTO"));
        assert_eq!(quote.issuer.as_deref(), Some("BINANCE"));
    }

    #[test]
    fn test_missing_required_field_abandons_item() {
        let body = r#"{"results":[{"symbol":"PETR4","longName":"Petrobras"}]}"#;
        let transport = ScriptedTransport::default().reply(&stock_url("PETR4"), Ok((200, body.into())));
        let importer = QuoteImporter::new(&transport, &config());

        assert!(matches!(
            importer.fetch_stock("PETR4"),
            Err(BackupError::UnexpectedResponse { .. })
        ));
    }

    #[test]
    fn test_empty_results_abandon_item() {
        let transport = ScriptedTransport::default()
            .reply(&stock_url("XXXX3"), Ok((200, r#"{"results":[]}"#.into())));
        let importer = QuoteImporter::new(&transport, &config());

        assert!(importer.fetch_stock("XXXX3").is_err());
    }

    #[test]
    fn test_rate_limit_is_retried() {
        let url = crypto_url("BTCBRL");
        let transport = ScriptedTransport::default()
            .reply(&url, Ok((429, String::new())))
            .reply(&url, Err(TransportError::Timeout("slow".into())))
            .reply(&url, Ok((200, BTCBRL.into())));
        let importer = QuoteImporter::new(&transport, &config());

        assert!(importer.fetch_crypto("BTCBRL").is_ok());
        assert_eq!(transport.calls_to(&url), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let url = crypto_url("BTCBRL");
        let transport = ScriptedTransport::default()
            .reply(&url, Ok((429, String::new())))
            .reply(&url, Ok((429, String::new())))
            .reply(&url, Ok((429, String::new())))
            .reply(&url, Ok((200, BTCBRL.into())));
        let importer = QuoteImporter::new(&transport, &config());

        let result = importer.fetch_crypto("BTCBRL");

        assert!(matches!(result, Err(BackupError::RequestAbandoned { .. })));
        assert_eq!(transport.calls_to(&url), 3);
    }

    #[test]
    fn test_other_failures_are_not_retried() {
        let url = crypto_url("BTCBRL");
        let transport = ScriptedTransport::default()
            .reply(&url, Ok((500, String::new())))
            .reply(&url, Ok((200, BTCBRL.into())));
        let importer = QuoteImporter::new(&transport, &config());

        assert!(importer.fetch_crypto("BTCBRL").is_err());
        assert_eq!(transport.calls_to(&url), 1);
    }

    #[test]
    fn test_token_is_not_leaked_into_errors() {
        let transport = ScriptedTransport::default();
        let importer = QuoteImporter::new(&transport, &config());

        let error = importer.fetch_stock("PETR4").unwrap_err().to_string();

        assert!(!error.contains("secret"));
        assert!(error.contains("PETR4"));
    }

    #[test]
    fn test_timeout_error_hides_api_token() {
        // Accepts connections and never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let mut held = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        let config = ImporterConfig {
            stock_base_url: format!("http://{}", addr),
            stock_api_token: Some("SUPERSECRET".to_string()),
            max_attempts: 2,
            retry_backoff_seconds: 0,
            request_timeout_seconds: 1,
            ..ImporterConfig::default()
        };
        let importer = QuoteImporter::from_config(&config).unwrap();

        let error = importer.fetch_stock("PETR4").unwrap_err().to_string();

        assert!(error.contains("timed out"), "{}", error);
        assert!(error.contains("PETR4"), "{}", error);
        assert!(error.contains("after 2 attempts"), "{}", error);
        assert!(!error.contains("SUPERSECRET"), "{}", error);
        assert!(!error.contains(&addr.to_string()), "{}", error);
    }

    #[test]
    fn test_url_without_token() {
        let config = ImporterConfig {
            stock_api_token: None,
            ..config()
        };
        let transport = ScriptedTransport::default();
        let importer = QuoteImporter::new(&transport, &config);

        assert_eq!(importer.stock_url("PETR4"), "https://stocks.test/api/quote/PETR4");
    }

    #[test]
    fn test_failed_items_do_not_abort_batch() {
        let transport = ScriptedTransport::default()
            .reply(&stock_url("PETR4"), Ok((200, PETR4.into())))
            .reply(&crypto_url("BTCBRL"), Ok((200, BTCBRL.into())));
        let importer = QuoteImporter::new(&transport, &config());
        let mut stored = Vec::new();

        let summary = importer.import_all(
            &codes(&["PETR4", "VALE3"]),
            &codes(&["BTCBRL", "ETHBRL"]),
            |quote| {
                stored.push(quote.code.clone());
                Ok(())
            },
        );

        assert_eq!(summary.imported, codes(&["PETR4", "BTCBRL"]));
        assert_eq!(summary.abandoned, codes(&["VALE3", "ETHBRL"]));
        assert_eq!(stored, codes(&["PETR4", "BTCBRL"]));
    }

    #[test]
    fn test_store_failure_counts_as_abandoned() {
        let transport = ScriptedTransport::default()
            .reply(&crypto_url("BTCBRL"), Ok((200, BTCBRL.into())));
        let importer = QuoteImporter::new(&transport, &config());

        let summary = importer.import_all(&[], &codes(&["BTCBRL"]), |_| {
            Err(BackupError::InvalidConfig("read-only".to_string()))
        });

        assert!(summary.imported.is_empty());
        assert_eq!(summary.abandoned, codes(&["BTCBRL"]));
    }
}
