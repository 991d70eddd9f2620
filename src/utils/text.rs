use regex::Regex;
use std::sync::LazyLock;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

/// 由主题生成文件名：小写，非字母数字字符折叠为下划线
pub fn slugify(topic: &str) -> String {
    let lower = topic.to_lowercase();
    let slug = NON_ALNUM.replace_all(&lower, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        "report".to_string()
    } else {
        slug.to_string()
    }
}

/// 按字符截断，避免切断多字节字符
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...(已截断)", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Support Vector Machines"), "support_vector_machines");
        assert_eq!(slugify("  C++ / Rust: a comparison!  "), "c_rust_a_comparison");
        assert_eq!(slugify("支持向量机"), "report");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("向量机器学习", 2), "向量...(已截断)");
    }
}
