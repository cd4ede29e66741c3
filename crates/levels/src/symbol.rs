use serde::{Deserialize, Serialize};

/// Instrument family used to pick pip size and the base stop distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolClass {
    /// Currency pair not quoted in yen.
    Forex,
    JpyPair,
    Gold,
    Silver,
    Oil,
    Index,
    Bitcoin,
    Ethereum,
    /// Any other `-USD` / `USDT` crypto pair.
    Crypto,
    Other,
}

const GOLD: &[&str] = &["GC=F", "GOLD", "XAUUSD", "XAU/USD"];
const SILVER: &[&str] = &["SI=F", "SILVER", "XAGUSD", "XAG/USD"];
const OIL: &[&str] = &["CL=F", "BZ=F", "USOIL", "UKOIL", "WTI", "BRENT"];
const CURRENCIES: &[&str] = &["USD", "EUR", "GBP", "CHF", "AUD", "CAD", "NZD", "JPY"];

impl SymbolClass {
    /// Classify a ticker such as `EURUSD=X`, `USDJPY`, `GC=F`, `^GSPC`,
    /// `BTC-USD` or `ETHUSDT`.
    pub fn classify(symbol: &str) -> Self {
        let s = symbol.trim().to_ascii_uppercase();

        if GOLD.contains(&s.as_str()) {
            return SymbolClass::Gold;
        }
        if SILVER.contains(&s.as_str()) {
            return SymbolClass::Silver;
        }
        if OIL.contains(&s.as_str()) {
            return SymbolClass::Oil;
        }
        if s.starts_with('^') || s.contains("INDEX") {
            return SymbolClass::Index;
        }
        if s.ends_with("-USD") || s.ends_with("USDT") || s.ends_with("BUSD") {
            return if s.starts_with("BTC") {
                SymbolClass::Bitcoin
            } else if s.starts_with("ETH") {
                SymbolClass::Ethereum
            } else {
                SymbolClass::Crypto
            };
        }
        if s.contains("JPY") {
            return SymbolClass::JpyPair;
        }
        if CURRENCIES.iter().any(|c| s.contains(c)) {
            return SymbolClass::Forex;
        }
        SymbolClass::Other
    }

    /// Smallest quoted increment.
    pub fn pip_size(&self) -> f64 {
        match self {
            SymbolClass::Forex => 0.0001,
            SymbolClass::JpyPair => 0.01,
            SymbolClass::Gold => 0.1,
            SymbolClass::Silver => 0.001,
            SymbolClass::Oil => 0.01,
            SymbolClass::Index => 1.0,
            SymbolClass::Bitcoin => 1.0,
            SymbolClass::Ethereum => 0.1,
            SymbolClass::Crypto => 0.0001,
            SymbolClass::Other => 0.0001,
        }
    }

    /// Unscaled base distance in pips.
    pub fn base_pips(&self) -> f64 {
        match self {
            SymbolClass::Forex => 15.0,
            SymbolClass::JpyPair => 25.0,
            SymbolClass::Bitcoin => 500.0,
            SymbolClass::Ethereum => 50.0,
            SymbolClass::Gold
            | SymbolClass::Silver
            | SymbolClass::Oil
            | SymbolClass::Index
            | SymbolClass::Crypto
            | SymbolClass::Other => 20.0,
        }
    }

    pub const ALL: [SymbolClass; 10] = [
        SymbolClass::Forex,
        SymbolClass::JpyPair,
        SymbolClass::Gold,
        SymbolClass::Silver,
        SymbolClass::Oil,
        SymbolClass::Index,
        SymbolClass::Bitcoin,
        SymbolClass::Ethereum,
        SymbolClass::Crypto,
        SymbolClass::Other,
    ];
}

impl std::fmt::Display for SymbolClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SymbolClass::Forex => "forex",
            SymbolClass::JpyPair => "jpy pair",
            SymbolClass::Gold => "gold",
            SymbolClass::Silver => "silver",
            SymbolClass::Oil => "oil",
            SymbolClass::Index => "index",
            SymbolClass::Bitcoin => "bitcoin",
            SymbolClass::Ethereum => "ethereum",
            SymbolClass::Crypto => "crypto",
            SymbolClass::Other => "other",
        };
        f.write_str(name)
    }
}
