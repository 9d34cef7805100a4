//! 工具函数模块

use sha2::{Digest, Sha256};

/// 计算SHA256哈希的十六进制表示
///
/// 用于把搜索条件等任意字符串压成定长、可作缓存键的指纹。
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// glob风格模式匹配，仅支持 `*` 通配符
///
/// 与远端缓存KEYS命令的模式语义保持一致，供本地缓存做模式失效。
pub fn glob_match(pattern: &str, input: &str) -> bool {
    if !pattern.contains('*') {
        return pattern == input;
    }

    let parts: Vec<&str> = pattern.split('*').collect();
    let mut pos = 0usize;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            // 模式不以 '*' 开头时必须前缀匹配
            if !input.starts_with(part) {
                return false;
            }
            pos = part.len();
        } else if i == parts.len() - 1 {
            // 最后一段必须后缀匹配，且不能与已消费部分重叠
            return input.len() >= pos + part.len() && input[pos..].ends_with(part);
        } else {
            match input[pos..].find(part) {
                Some(idx) => pos += idx + part.len(),
                None => return false,
            }
        }
    }

    true
}

/// 格式化字节数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        let h1 = sha256_hex("hello");
        let h2 = sha256_hex("hello");
        let h3 = sha256_hex("world");

        assert_eq!(h1.len(), 64);
        assert_eq!(h1, h2); // 相同输入结果稳定
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_glob_match_prefix() {
        assert!(glob_match("template:*", "template:id:42"));
        assert!(glob_match("template:*", "template:"));
        assert!(!glob_match("template:*", "user:id:42"));
    }

    #[test]
    fn test_glob_match_exact_and_infix() {
        assert!(glob_match("user:id:1", "user:id:1"));
        assert!(!glob_match("user:id:1", "user:id:10"));
        assert!(glob_match("search:*:week", "search:abc123:week"));
        assert!(!glob_match("search:*:week", "search:abc123:month"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
    }
}
