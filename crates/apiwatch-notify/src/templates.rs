//! Message templates.
//!
//! Both channels share one set of templates; they differ only in how bold
//! text is written.

use num_bigint::BigUint;

use crate::alerts::{Alert, AlertKind, TokenAlert, TokenAlertCode, UsageCounters, UsageReport};

/// Decimals of the monitored token.
const TOKEN_DECIMALS: u32 = 18;

/// Markdown dialect of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Telegram legacy Markdown.
    Telegram,
    /// Slack mrkdwn.
    Slack,
}

impl Dialect {
    fn bold(&self, text: &str) -> String {
        match self {
            Dialect::Telegram => format!("***{}***", text),
            Dialect::Slack => format!("*{}*", text),
        }
    }

    fn field(&self, label: &str, value: impl std::fmt::Display) -> String {
        format!("{} {}\n", self.bold(&format!("{}:", label)), value)
    }
}

/// Render an alert for a channel.
pub fn render(alert: &Alert, dialect: Dialect) -> String {
    match &alert.kind {
        AlertKind::Inactive => status_message(alert, dialect, "ALERT!", "INACTIVE"),
        AlertKind::RpcDown => status_message(alert, dialect, "ALERT!", "RPC DOWN"),
        AlertKind::Synced => status_message(alert, dialect, "INFO!", "INDEXER IS NOW SYNCED"),
        AlertKind::Active => status_message(alert, dialect, "INFO!", "API IS ACTIVE"),
        AlertKind::OutOfSync {
            blocks_behind,
            updated_at,
            recovering,
        } => {
            let status = if *recovering { "RECOVERING" } else { "OUT OF SYNC" };
            let mut text = status_message(alert, dialect, "ALERT!", status);
            text.push_str(&dialect.field("BLOCKS BEHIND", blocks_behind));
            text.push_str(&dialect.field("UPDATED AT", updated_at));
            text
        }
        AlertKind::UsageHigh { report } => usage_message(alert, dialect, "ALERT!", report, None),
        AlertKind::UsageInRange { report } => usage_message(
            alert,
            dialect,
            "INFO!",
            report,
            Some("LIMIT INCREASED! USAGE WITHIN RANGE"),
        ),
        AlertKind::DailyUsage { report } => usage_message(alert, dialect, "INFO!", report, None),
        AlertKind::MonitorActive => format!("{} \u{2705}", dialect.bold("API monitor is Active")),
        AlertKind::Token { alert: token } => token_message(alert, dialect, token),
    }
}

fn header(alert: &Alert, dialect: Dialect, level: &str) -> String {
    format!("{}\n{}", dialect.bold(level), dialect.field("API", &alert.name))
}

fn status_message(alert: &Alert, dialect: Dialect, level: &str, status: &str) -> String {
    let mut text = header(alert, dialect, level);
    text.push_str(&dialect.field("ROUTE", alert.route()));
    text.push_str(&dialect.field("STATUS", status));
    text
}

fn usage_message(
    alert: &Alert,
    dialect: Dialect,
    level: &str,
    report: &UsageReport,
    footer: Option<&str>,
) -> String {
    let mut text = header(alert, dialect, level);
    match &report.counters {
        UsageCounters::Image { current, allowed } => {
            text.push_str(&dialect.field("CURRENT_USAGE", current));
            text.push_str(&dialect.field("ALLOWED_USAGE", allowed));
        }
        UsageCounters::Video {
            video_count,
            total_storage_minutes,
            total_storage_minutes_limit,
        } => {
            text.push_str(&dialect.field("VIDEO_COUNT", video_count));
            text.push_str(&dialect.field("TOTAL_STORAGE_MINUTES", total_storage_minutes));
            text.push_str(&dialect.field(
                "TOTAL_STORAGE_MINUTES_LIMIT",
                total_storage_minutes_limit,
            ));
        }
    }
    text.push_str(&dialect.field("PERCENTAGE", report.percentage));
    if let Some(footer) = footer {
        text.push_str(&dialect.bold(footer));
        text.push('\n');
    }
    text
}

fn token_message(alert: &Alert, dialect: Dialect, token: &TokenAlert) -> String {
    let (emoji, title, severity) = match token.code {
        TokenAlertCode::Critical => ("\u{26a0}\u{fe0f}", "LOW BALANCE ALERT", "Low Balance"),
        TokenAlertCode::Low => ("\u{26a0}\u{fe0f}", "LOW TOKEN BALANCE ALERT", "Low Balance"),
        TokenAlertCode::Warning => ("\u{1f7e0}", "WARNING: TOKEN BALANCE LOW", "Low Balance"),
        TokenAlertCode::Recovered => ("\u{2705}", "TOKEN BALANCE RECOVERED", "OK"),
    };
    let ctx = &token.context;

    let mut text = format!("{} {} {}\n\n", emoji, dialect.bold(title), emoji);
    text.push_str(&dialect.field("API Name", &alert.name));
    text.push_str(&dialect.field("Chain ID", &ctx.chain_id));
    text.push_str(&dialect.field("Contract Address", format!("`{}`", ctx.contract_address)));
    text.push_str(&dialect.field("Wallet Address", format!("`{}`", ctx.wallet_address)));
    text.push('\n');
    text.push_str(&dialect.field("Token Balance", format_token_amount(&ctx.balance)));
    if let Some(ref minimum) = ctx.minimum_required {
        text.push_str(&dialect.field("Minimum Required", format_token_amount(minimum)));
    }
    text.push_str(&dialect.field("Status", severity));
    text.push_str(&dialect.field("Checked At", ctx.checked_at.to_rfc3339()));
    text.push_str(&format!(
        "\n\u{1f517} [View on BaseScan](https://basescan.org/token/{}?a={})",
        ctx.contract_address, ctx.wallet_address
    ));
    text
}

/// Format a base-unit amount as whole tokens with four decimals and
/// thousands separators, rounding half up.
pub fn format_token_amount(value: &BigUint) -> String {
    const SHOWN: u32 = 4;
    let divisor = BigUint::from(10u32).pow(TOKEN_DECIMALS - SHOWN);
    let scaled = (value + &divisor / 2u32) / &divisor;
    let unit = BigUint::from(10u32).pow(SHOWN);
    let whole = (&scaled / &unit).to_string();
    let frac = (&scaled % &unit).to_string();

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}.{:0>width$}", grouped, frac, width = SHOWN as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::TokenBalanceContext;
    use chrono::{FixedOffset, TimeZone};

    fn tokens(whole: u64) -> BigUint {
        BigUint::from(whole) * BigUint::from(10u32).pow(TOKEN_DECIMALS)
    }

    fn alert(kind: AlertKind) -> Alert {
        Alert::new("Indexer", "https://idx.example.com/status", kind)
    }

    #[test]
    fn test_inactive_dialects() {
        let alert = alert(AlertKind::Inactive);
        let telegram = render(&alert, Dialect::Telegram);
        let slack = render(&alert, Dialect::Slack);

        assert!(telegram.contains("***ALERT!***"));
        assert!(telegram.contains("***STATUS:*** INACTIVE"));
        assert!(slack.contains("*ALERT!*"));
        assert!(slack.contains("*STATUS:* INACTIVE"));
        assert!(!slack.contains("***"));
    }

    #[test]
    fn test_route_strips_health_suffix() {
        let text = render(&alert(AlertKind::Active), Dialect::Slack);
        assert!(text.contains("*ROUTE:* https://idx.example.com\n"));
        assert!(text.contains("API IS ACTIVE"));
    }

    #[test]
    fn test_out_of_sync_and_recovering() {
        let out = render(
            &alert(AlertKind::OutOfSync {
                blocks_behind: 120,
                updated_at: "2024-01-01T00:00:00Z".to_string(),
                recovering: false,
            }),
            Dialect::Slack,
        );
        assert!(out.contains("OUT OF SYNC"));
        assert!(out.contains("*BLOCKS BEHIND:* 120"));
        assert!(out.contains("*UPDATED AT:* 2024-01-01T00:00:00Z"));

        let recovering = render(
            &alert(AlertKind::OutOfSync {
                blocks_behind: 80,
                updated_at: "now".to_string(),
                recovering: true,
            }),
            Dialect::Telegram,
        );
        assert!(recovering.contains("RECOVERING"));
        assert!(!recovering.contains("OUT OF SYNC"));
    }

    #[test]
    fn test_usage_in_range_image() {
        let report = UsageReport {
            percentage: 0.5,
            counters: UsageCounters::Image {
                current: 50.0,
                allowed: 100.0,
            },
        };
        let text = render(&alert(AlertKind::UsageInRange { report }), Dialect::Slack);
        assert!(text.contains("*CURRENT_USAGE:* 50"));
        assert!(text.contains("*ALLOWED_USAGE:* 100"));
        assert!(text.contains("*PERCENTAGE:* 0.5"));
        assert!(text.contains("LIMIT INCREASED! USAGE WITHIN RANGE"));
    }

    #[test]
    fn test_usage_high_video() {
        let report = UsageReport {
            percentage: 0.95,
            counters: UsageCounters::Video {
                video_count: "12".to_string(),
                total_storage_minutes: 950.0,
                total_storage_minutes_limit: 1000.0,
            },
        };
        let text = render(&alert(AlertKind::UsageHigh { report }), Dialect::Telegram);
        assert!(text.contains("***TOTAL_STORAGE_MINUTES:*** 950"));
        assert!(text.contains("***TOTAL_STORAGE_MINUTES_LIMIT:*** 1000"));
        assert!(text.contains("0.95"));
    }

    #[test]
    fn test_token_message() {
        let checked_at = FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .unwrap();
        let token = TokenAlert {
            code: TokenAlertCode::Low,
            context: TokenBalanceContext {
                chain_id: "8453".to_string(),
                contract_address: "0xabc".to_string(),
                wallet_address: "0xdef".to_string(),
                balance: tokens(900_000),
                minimum_required: Some(tokens(1_000_000)),
                checked_at,
            },
        };
        let text = render(&alert(AlertKind::Token { alert: token }), Dialect::Slack);
        assert!(text.contains("LOW TOKEN BALANCE ALERT"));
        assert!(text.contains("*Token Balance:* 900,000.0000"));
        assert!(text.contains("*Minimum Required:* 1,000,000.0000"));
        assert!(text.contains("basescan.org/token/0xabc?a=0xdef"));
    }

    #[test]
    fn test_format_token_amount_rounds_half_up() {
        // 1.23455 tokens -> 1.2346
        let value = BigUint::from(123_455u64) * BigUint::from(10u32).pow(13);
        assert_eq!(format_token_amount(&value), "1.2346");
        assert_eq!(format_token_amount(&BigUint::from(0u32)), "0.0000");
        assert_eq!(format_token_amount(&tokens(25_000_000)), "25,000,000.0000");
        assert_eq!(format_token_amount(&tokens(999)), "999.0000");
    }

    #[test]
    fn test_monitor_active() {
        let text = render(&Alert::monitor_active(), Dialect::Slack);
        assert!(text.starts_with("*API monitor is Active*"));
    }
}
