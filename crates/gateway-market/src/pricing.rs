//! 다중 소스 가격 통계.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// 중앙값. 짝수 개면 가운데 두 값의 평균입니다.
pub fn median(prices: &[Decimal]) -> Option<Decimal> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort();

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / Decimal::TWO)
    } else {
        Some(sorted[mid])
    }
}

/// 중앙값 대비 최대 상대 편차 `max(|p - median| / median)`.
pub fn max_deviation(prices: &[Decimal], median: Decimal) -> Decimal {
    if median.is_zero() {
        return Decimal::ZERO;
    }
    prices
        .iter()
        .map(|p| (*p - median).abs() / median)
        .max()
        .unwrap_or(Decimal::ZERO)
}

/// 신뢰도 점수 (0 ~ 100).
///
/// 편차 항이 70점, 응답 비율 항이 30점입니다.
/// 편차가 100%를 넘으면 음수가 될 수 있어 0으로 잘라냅니다.
pub fn confidence(deviation: Decimal, successes: usize, total: usize) -> f64 {
    let deviation = deviation.to_f64().unwrap_or(f64::MAX);
    let coverage = if total == 0 {
        0.0
    } else {
        successes as f64 / total as f64
    };
    ((1.0 - deviation) * 70.0 + coverage * 30.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[dec!(101), dec!(99), dec!(100)]), Some(dec!(100)));
        assert_eq!(median(&[dec!(50050), dec!(50000)]), Some(dec!(50025)));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_max_deviation() {
        let prices = [dec!(100), dec!(101), dec!(99)];
        assert_eq!(max_deviation(&prices, dec!(100)), dec!(0.01));
        assert_eq!(max_deviation(&prices, Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_confidence_values() {
        assert!((confidence(dec!(0.01), 3, 3) - 99.3).abs() < 1e-9);
        assert_eq!(confidence(Decimal::ZERO, 3, 3), 100.0);
        // 2/3 응답, 편차 0
        assert!((confidence(Decimal::ZERO, 2, 3) - 90.0).abs() < 1e-9);
        assert_eq!(confidence(dec!(5), 1, 3), 0.0);
    }

    proptest! {
        #[test]
        fn confidence_decreases_with_deviation(
            a in 0u32..10_000,
            b in 0u32..10_000,
            total in 1usize..8,
            succ_seed in 0usize..8,
        ) {
            prop_assume!(a != b);
            let successes = succ_seed.min(total);
            let (low, high) = if a < b { (a, b) } else { (b, a) };
            let low = Decimal::new(low as i64, 4);
            let high = Decimal::new(high as i64, 4);

            prop_assert!(confidence(low, successes, total) > confidence(high, successes, total));
        }

        #[test]
        fn confidence_increases_with_sources(
            dev in 0u32..10_000,
            total in 1usize..8,
            succ_seed in 0usize..8,
        ) {
            let deviation = Decimal::new(dev as i64, 4);
            let successes = succ_seed % total;

            prop_assert!(
                confidence(deviation, successes + 1, total) > confidence(deviation, successes, total)
            );
        }

        #[test]
        fn confidence_stays_in_range(dev in 0u32..100_000, total in 1usize..8, succ_seed in 0usize..8) {
            let c = confidence(Decimal::new(dev as i64, 4), succ_seed.min(total), total);
            prop_assert!((0.0..=100.0).contains(&c));
        }
    }
}
