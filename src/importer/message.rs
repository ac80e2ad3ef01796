// ==========================================
// 动态台账导入系统 - 本地化消息
// ==========================================
// 职责: 消息键 + 参数,按运行语言渲染
// ==========================================

use crate::i18n::{t_in, DEFAULT_LOCALE};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: &'static str,
    pub args: Vec<(&'static str, String)>,
}

impl Message {
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, name: &'static str, value: impl ToString) -> Self {
        self.args.push((name, value.to_string()));
        self
    }

    /// 以指定语言渲染
    pub fn render(&self, locale: &str) -> String {
        let args: Vec<(&str, &str)> = self
            .args
            .iter()
            .map(|(k, v)| (*k, v.as_str()))
            .collect();
        t_in(locale, self.key, &args)
    }
}

// 日志输出使用默认语言
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(DEFAULT_LOCALE))
    }
}
