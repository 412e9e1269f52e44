//! tracing 기반 로깅 초기화.
//!
//! 레벨과 형식은 설정 파일의 `[logging]` 섹션에서 읽고,
//! `RUST_LOG`/`LOG_FORMAT` 환경 변수가 있으면 그 값을 우선합니다.
//!
//! 형식: `pretty` (개발), `json` (로그 수집), `compact` (한 줄).

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

/// 로그 출력 형식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// 확정된 로깅 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` 지시어 (예: "info,gateway_market=debug")
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// 설정 파일 값에 환경 변수 오버라이드를 적용합니다.
    pub fn from_settings(settings: &LoggingConfig) -> Self {
        Self::resolve(
            settings,
            std::env::var("RUST_LOG").ok(),
            std::env::var("LOG_FORMAT").ok(),
        )
    }

    /// 설정 파일 없이 환경 변수와 기본값만 사용합니다.
    pub fn from_env() -> Self {
        Self::from_settings(&LoggingConfig::default())
    }

    fn resolve(
        settings: &LoggingConfig,
        rust_log: Option<String>,
        log_format: Option<String>,
    ) -> Self {
        // 알 수 없는 형식 문자열은 무시하고 다음 후보로 넘어감
        let format = log_format
            .and_then(|s| s.parse().ok())
            .or_else(|| settings.format.parse().ok())
            .unwrap_or_default();

        Self {
            level: rust_log.unwrap_or_else(|| settings.level.clone()),
            format,
        }
    }
}

/// 전역 subscriber를 설치합니다. 두 번째 호출은 에러를 반환합니다.
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_new(&config.level)?;

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .try_init()?;

    tracing::info!(format = ?config.format, level = %config.level, "Logging initialized");
    Ok(())
}

/// `RUST_LOG`/`LOG_FORMAT`만으로 로깅을 초기화합니다.
pub fn init_logging_from_env() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LogConfig::from_env())
}

/// 심볼(및 타임프레임) 필드가 붙은 span을 만듭니다.
#[macro_export]
macro_rules! market_span {
    ($name:expr, $symbol:expr) => {
        tracing::info_span!($name, symbol = %$symbol)
    };
    ($name:expr, $symbol:expr, $timeframe:expr) => {
        tracing::info_span!($name, symbol = %$symbol, timeframe = %$timeframe)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str, format: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
            format: format.to_string(),
        }
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_settings_used_without_env() {
        let config = LogConfig::resolve(&settings("debug", "json"), None, None);
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_env_overrides_settings() {
        let config = LogConfig::resolve(
            &settings("info", "pretty"),
            Some("gateway_market=trace".to_string()),
            Some("compact".to_string()),
        );
        assert_eq!(config.level, "gateway_market=trace");
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_unknown_format_falls_back() {
        let config = LogConfig::resolve(&settings("info", "json"), None, Some("xml".to_string()));
        assert_eq!(config.format, LogFormat::Json);

        let config = LogConfig::resolve(&settings("info", "yaml"), None, None);
        assert_eq!(config.format, LogFormat::Pretty);
    }
}
