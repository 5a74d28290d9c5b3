// ==========================================
// 云成本变动归因 - 数值工具
// ==========================================
// 职责: 全部除法/百分比/取整的统一入口
// 红线: 永不产生 NaN / Infinity，分母为 0 或非有限时返回 0
// ==========================================

/// 视为 0 的绝对容差（浮点累加噪声）
pub const EPSILON: f64 = 1e-9;

/// 安全除法
pub fn safe_divide(numerator: f64, denominator: f64) -> f64 {
    if !numerator.is_finite() || !denominator.is_finite() || denominator.abs() < EPSILON {
        return 0.0;
    }
    let result = numerator / denominator;
    if result.is_finite() {
        result
    } else {
        0.0
    }
}

/// part 占 whole 的百分比
pub fn percent_of(part: f64, whole: f64) -> f64 {
    safe_divide(part, whole) * 100.0
}

/// 金额折算为整数分（非有限值视为 0）
pub fn to_cents(value: f64) -> i64 {
    if !value.is_finite() {
        return 0;
    }
    (value * 100.0).round() as i64
}

pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// 保留两位小数（货币口径）
pub fn round2(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 100.0).round() / 100.0;
    // 消除 -0.0
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// 保留一位小数（百分比口径）
pub fn round1(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let rounded = (value * 10.0).round() / 10.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

pub fn is_effectively_zero(value: f64) -> bool {
    !value.is_finite() || value.abs() < EPSILON
}

/// 变动百分比展示: 上期为 0 且本期 > 0 -> NEW；本期为 0 且上期 > 0 -> REMOVED
///
/// # 返回
/// (数值百分比, 展示字符串)
pub fn delta_percent(previous: f64, current: f64) -> (Option<f64>, String) {
    if is_effectively_zero(previous) && current > EPSILON {
        return (None, "NEW".to_string());
    }
    if is_effectively_zero(current) && previous > EPSILON {
        return (Some(-100.0), "REMOVED".to_string());
    }
    if is_effectively_zero(previous) {
        return (None, "0.0%".to_string());
    }
    let pct = round1(percent_of(current - previous, previous.abs()));
    (Some(pct), format!("{:+.1}%", pct))
}

/// 单一币种时返回该币种，无币种或多币种返回 None
pub fn sole_currency(currencies: &[String]) -> Option<&str> {
    match currencies {
        [only] => Some(only.as_str()),
        _ => None,
    }
}

/// 货币展示（带千分位）
///
/// USD 使用 `$` 前缀；其他币种以代码作后缀；币种未知时只输出数字
pub fn format_money(value: f64, currency: Option<&str>) -> String {
    let value = round2(value);
    let sign = if value < 0.0 { "-" } else { "" };
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match currency {
        Some("USD") => format!("{}${}.{:02}", sign, grouped, frac),
        Some(code) => format!("{}{}.{:02} {}", sign, grouped, frac, code),
        None => format!("{}{}.{:02}", sign, grouped, frac),
    }
}
