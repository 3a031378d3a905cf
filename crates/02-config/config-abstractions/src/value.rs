//! 类型化配置值

use std::time::Duration;

/// 可由配置字符串解析的类型
///
/// 解析失败返回 `None`，由调用方补充节名、键名生成错误。
pub trait ConfigValue: Sized {
    /// 类型描述，用于错误信息
    const TYPE_NAME: &'static str;

    /// 从原始字符串解析
    fn parse_raw(raw: &str) -> Option<Self>;

    /// 转换回原始字符串
    fn to_raw(&self) -> String;
}

impl ConfigValue for String {
    const TYPE_NAME: &'static str = "字符串";

    fn parse_raw(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn to_raw(&self) -> String {
        self.clone()
    }
}

impl ConfigValue for bool {
    const TYPE_NAME: &'static str = "布尔值";

    fn parse_raw(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "true" | "yes" | "y" | "on" | "1" => Some(true),
            "false" | "no" | "n" | "off" | "0" => Some(false),
            _ => None,
        }
    }

    fn to_raw(&self) -> String {
        self.to_string()
    }
}

macro_rules! impl_numeric_value {
    ($($ty:ty => $name:expr),* $(,)?) => {
        $(
            impl ConfigValue for $ty {
                const TYPE_NAME: &'static str = $name;

                fn parse_raw(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }

                fn to_raw(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_numeric_value! {
    i32 => "整数",
    i64 => "整数",
    u32 => "非负整数",
    u64 => "非负整数",
    usize => "非负整数",
    f64 => "浮点数",
}

impl ConfigValue for Vec<String> {
    const TYPE_NAME: &'static str = "列表";

    fn parse_raw(raw: &str) -> Option<Self> {
        Some(raw.split_whitespace().map(str::to_string).collect())
    }

    fn to_raw(&self) -> String {
        self.join(" ")
    }
}

impl ConfigValue for Duration {
    const TYPE_NAME: &'static str = "时间 (hh[:mm[:ss]])";

    fn parse_raw(raw: &str) -> Option<Self> {
        parse_time(raw)
    }

    fn to_raw(&self) -> String {
        format_time(*self)
    }
}

/// 解析 `hh[:mm[:ss]]` 格式的时间
///
/// 只有一段时按小时解释。
pub fn parse_time(raw: &str) -> Option<Duration> {
    let parts: Vec<&str> = raw.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut seconds: u64 = 0;
    for (index, part) in parts.iter().enumerate() {
        let value: u64 = part.trim().parse().ok()?;
        if index > 0 && value >= 60 {
            return None;
        }
        let unit = match index {
            0 => 3600,
            1 => 60,
            _ => 1,
        };
        seconds = seconds.checked_add(value.checked_mul(unit)?)?;
    }
    Some(Duration::from_secs(seconds))
}

/// 格式化为 `hh:mm`，秒数不为零时为 `hh:mm:ss`
pub fn format_time(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total / 60) % 60, total % 60);
    if seconds == 0 {
        format!("{hours}:{minutes:02}")
    } else {
        format!("{hours}:{minutes:02}:{seconds:02}")
    }
}
