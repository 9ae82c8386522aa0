use chrono::NaiveDateTime;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Stock,
    Crypto,
}

impl InstrumentKind {
    /// Value stored in the `Kind` column
    pub fn code(&self) -> &'static str {
        match self {
            InstrumentKind::Stock => "ACAO",
            InstrumentKind::Crypto => "CRIPTO",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One instrument quote, keyed by `code` in the `Investments` table
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRow {
    pub code: String,
    pub name: String,
    pub kind: InstrumentKind,
    pub exchange: String,
    pub currency: String,
    pub price: f64,
    pub day_change: Option<f64>,
    pub change_12m: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub assets_under_management: Option<f64>,
    pub average_volume: Option<f64>,
    pub risk: Option<String>,
    pub issuer: Option<String>,
    pub maturity: Option<String>,
    pub return_rate: Option<f64>,
    pub updated_at: NaiveDateTime,
}
