// ==========================================
// 国际化 (i18n) 模块
// ==========================================
// 使用 rust-i18n 库
// 支持英文（默认）、日文、中文
// ==========================================
// 注意: rust_i18n::i18n! 宏已在 lib.rs 中初始化
// 后台导入任务按请求语言取消息（t_in）,不修改全局 locale
// ==========================================

/// 默认语言
pub const DEFAULT_LOCALE: &str = "en";

/// 获取当前语言
pub fn current_locale() -> String {
    rust_i18n::locale().to_string()
}

/// 设置语言
///
/// # 参数
/// - locale: 语言代码（"en" / "ja" / "zh-CN"）
pub fn set_locale(locale: &str) {
    rust_i18n::set_locale(locale);
}

/// 规范化语言代码
///
/// "ja-JP" -> "ja", "zh" -> "zh-CN",未知语言回退为默认语言
pub fn normalize_locale(lang: &str) -> String {
    let lang = lang.trim();
    let available = rust_i18n::available_locales!();

    if let Some(exact) = available.iter().find(|l| l.eq_ignore_ascii_case(lang)) {
        return exact.to_string();
    }

    let primary = lang.split(['-', '_']).next().unwrap_or("").to_lowercase();
    available
        .iter()
        .find(|l| l.split('-').next().map(str::to_lowercase).as_deref() == Some(primary.as_str()))
        .map(|l| l.to_string())
        .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
}

/// 单次扫描替换 `%{name}` 占位符
///
/// 参数值原样写入,其中的占位符不会再次展开; 未知占位符保留
fn fill_args(template: String, args: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();

    while let Some(start) = rest.find("%{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            rest = &rest[start..];
            break;
        };
        let name = &after[..end];
        match args.iter().find(|(k, _)| *k == name) {
            Some((_, v)) => out.push_str(v),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// 翻译消息（无参数）
///
/// # 示例
/// ```no_run
/// use datastore_import::i18n::t;
/// let msg = t("import.error.required");
/// ```
pub fn t(key: &str) -> String {
    rust_i18n::t!(key).to_string()
}

/// 翻译消息（带参数）
///
/// # 示例
/// ```no_run
/// use datastore_import::i18n::t_with_args;
/// let msg = t_with_args("import.error.unknown_user", &[("name", "alice")]);
/// ```
pub fn t_with_args(key: &str, args: &[(&str, &str)]) -> String {
    fill_args(rust_i18n::t!(key).to_string(), args)
}

/// 以指定语言翻译消息
pub fn t_in(locale: &str, key: &str, args: &[(&str, &str)]) -> String {
    fill_args(rust_i18n::t!(key, locale = locale).to_string(), args)
}
