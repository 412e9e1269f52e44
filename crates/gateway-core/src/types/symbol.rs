//! 심볼 표기 정규화.
//!
//! 내부 표기는 `BASE/QUOTE` (예: "BTC/USDT")입니다.
//! URL 경로에서는 `BTC-USDT`, 거래소 API에서는 `BTCUSDT` 등으로 변환됩니다.

/// 흔히 쓰이는 호가 자산 (구분자 없는 심볼 분리용).
const KNOWN_QUOTES: [&str; 7] = ["USDT", "USDC", "BUSD", "FDUSD", "BTC", "ETH", "USD"];

/// 다양한 입력 표기를 `BASE/QUOTE`로 정규화합니다.
///
/// `btc-usdt`, `BTC_USDT`, `BTCUSDT`, `btc/usdt` 모두 `BTC/USDT`가 됩니다.
/// 호가 자산을 찾을 수 없으면 대문자로만 바꿔 반환합니다.
pub fn normalize_symbol(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();

    for sep in ['/', '-', '_', ':'] {
        if let Some((base, quote)) = upper.split_once(sep) {
            return format!("{}/{}", base, quote);
        }
    }

    for quote in KNOWN_QUOTES {
        if let Some(base) = upper.strip_suffix(quote) {
            if !base.is_empty() {
                return format!("{}/{}", base, quote);
            }
        }
    }

    upper
}

/// 정규화된 심볼을 (기준 자산, 호가 자산)으로 분리합니다.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    symbol
        .split_once('/')
        .filter(|(base, quote)| !base.is_empty() && !quote.is_empty())
}
