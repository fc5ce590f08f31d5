//! 调用栈错误与栈格式化
//!
//! `TracedError` 在创建和每次包装时各记录一个调用点 `Frame`，
//! `StackFormatter` 把这些调用点渲染成从入口到出错点的调用路径。

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::BoxError;

/// 默认过滤的运行时内部帧
pub const DEFAULT_INTERNAL_MARKERS: &[&str] = &["tokio::runtime", "std::rt", "core::ops::function"];

/// 调用点描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    function: Option<&'static str>,
    file: &'static str,
    line: u32,
}

impl Frame {
    pub const fn new(function: Option<&'static str>, file: &'static str, line: u32) -> Self {
        Self {
            function,
            file,
            line,
        }
    }

    pub fn function(&self) -> Option<&'static str> {
        self.function
    }

    pub fn file(&self) -> &'static str {
        self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

/// 在调用处捕获一个 `Frame`（函数全名、文件、行号）
#[macro_export]
macro_rules! frame {
    () => {{
        fn __frame_marker() {}
        fn __type_name_of<T>(_: T) -> &'static str {
            ::std::any::type_name::<T>()
        }
        let name = __type_name_of(__frame_marker);
        $crate::Frame::new(
            Some(name.strip_suffix("::__frame_marker").unwrap_or(name)),
            ::std::file!(),
            ::std::line!(),
        )
    }};
}

/// 创建带调用点的错误
///
/// ```ignore
/// return Err(traced!("user {} not found", user_id).into());
/// ```
#[macro_export]
macro_rules! traced {
    ($($arg:tt)+) => {
        $crate::TracedError::new(::std::format!($($arg)+), $crate::frame!())
    };
}

/// 包装已有错误并追加当前调用点
#[macro_export]
macro_rules! wrap_traced {
    ($err:expr, $($arg:tt)+) => {
        $crate::TracedError::wrap($err, ::std::format!($($arg)+), $crate::frame!())
    };
}

/// 暴露调用栈的能力
pub trait StackTrace {
    /// 由内向外排列的调用点
    fn stack_frames(&self) -> &[Frame];
}

/// 携带调用点的错误
#[derive(Debug)]
pub struct TracedError {
    message: String,
    frames: Vec<Frame>,
    source: Option<BoxError>,
}

impl TracedError {
    pub fn new(message: impl Into<String>, frame: Frame) -> Self {
        Self {
            message: message.into(),
            frames: vec![frame],
            source: None,
        }
    }

    /// 包装错误；若内层已是 `TracedError`，继承其调用点后再追加外层调用点
    pub fn wrap(err: impl Into<BoxError>, message: impl Into<String>, frame: Frame) -> Self {
        let err = err.into();
        let message: String = message.into();
        let mut frames = err
            .downcast_ref::<TracedError>()
            .map(|inner| inner.frames.clone())
            .unwrap_or_default();
        frames.push(frame);

        Self {
            message: format!("{}: {}", message, err),
            frames,
            source: Some(err),
        }
    }
}

impl fmt::Display for TracedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for TracedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn StdError + 'static))
    }
}

impl StackTrace for TracedError {
    fn stack_frames(&self) -> &[Frame] {
        &self.frames
    }
}

/// 解析后的调用点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFrame {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// 符号解析
pub trait SymbolResolver: Send + Sync {
    /// 无法解析的帧返回 `None`，格式化时跳过
    fn resolve(&self, frame: &Frame) -> Option<ResolvedFrame>;
}

/// 直接使用 `frame!` 捕获到的函数名
#[derive(Debug, Clone, Copy, Default)]
pub struct CapturedSymbols;

impl SymbolResolver for CapturedSymbols {
    fn resolve(&self, frame: &Frame) -> Option<ResolvedFrame> {
        frame.function().map(|function| ResolvedFrame {
            function: function.to_string(),
            file: frame.file().to_string(),
            line: frame.line(),
        })
    }
}

/// 渲染后的调用栈错误，只保留文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceReport(String);

impl TraceReport {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for TraceReport {}

/// 格式化结果：无调用栈的错误原样返回
#[derive(Debug)]
pub enum Formatted<'a> {
    Plain(&'a (dyn StdError + 'static)),
    Traced(TraceReport),
}

impl fmt::Display for Formatted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(err) => fmt::Display::fmt(err, f),
            Self::Traced(report) => fmt::Display::fmt(report, f),
        }
    }
}

type StackCheck = for<'a> fn(&'a (dyn StdError + 'static)) -> Option<&'a dyn StackTrace>;

fn as_stack_trace<'a, E>(err: &'a (dyn StdError + 'static)) -> Option<&'a dyn StackTrace>
where
    E: StdError + StackTrace + 'static,
{
    err.downcast_ref::<E>().map(|traced| traced as &dyn StackTrace)
}

/// 调用栈格式化器
///
/// 只有登记过的错误类型才按调用栈渲染，默认登记 `TracedError`
#[derive(Clone)]
pub struct StackFormatter {
    resolver: Arc<dyn SymbolResolver>,
    internal_markers: Vec<String>,
    stack_types: Vec<StackCheck>,
}

impl StackFormatter {
    pub fn new(resolver: Arc<dyn SymbolResolver>, internal_markers: Vec<String>) -> Self {
        Self {
            resolver,
            internal_markers,
            stack_types: vec![as_stack_trace::<TracedError> as StackCheck],
        }
    }

    /// 登记一种实现了 `StackTrace` 的错误类型
    pub fn with_stack_type<E>(mut self) -> Self
    where
        E: StdError + StackTrace + 'static,
    {
        self.stack_types.push(as_stack_trace::<E>);
        self
    }

    /// 错误是否暴露调用栈
    pub fn stack_trace<'a>(&self, err: &'a (dyn StdError + 'static)) -> Option<&'a dyn StackTrace> {
        self.stack_types.iter().find_map(|check| check(err))
    }

    /// 替换符号解析器
    pub fn with_resolver(mut self, resolver: Arc<dyn SymbolResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn format_error<'a>(&self, err: &'a (dyn StdError + 'static)) -> Formatted<'a> {
        match self.stack_trace(err) {
            Some(traced) => Formatted::Traced(TraceReport(
                self.render(&err.to_string(), traced.stack_frames()),
            )),
            None => Formatted::Plain(err),
        }
    }

    /// `Error: <msg> | Error trace: <outer> -> ... -> <innermost>`
    pub fn render(&self, message: &str, frames: &[Frame]) -> String {
        let call_path = self.call_path(frames);

        let mut out = String::with_capacity(message.len() + 32 * call_path.len() + 32);
        out.push_str("Error: ");
        out.push_str(message);
        out.push_str(" | Error trace: ");
        for (i, entry) in call_path.iter().rev().enumerate() {
            if i > 0 {
                out.push_str(" -> ");
            }
            out.push_str(entry);
        }
        out
    }

    /// 由内向外的 `name (file:line)` 列表
    fn call_path(&self, frames: &[Frame]) -> Vec<String> {
        frames
            .iter()
            .filter_map(|frame| self.resolver.resolve(frame))
            .filter(|resolved| !self.is_internal(&resolved.function))
            .map(|resolved| {
                format!(
                    "{} ({}:{})",
                    simplify_function_name(&resolved.function),
                    resolved.file,
                    resolved.line
                )
            })
            .collect()
    }

    fn is_internal(&self, function: &str) -> bool {
        self.internal_markers
            .iter()
            .any(|marker| function.contains(marker.as_str()))
    }
}

impl Default for StackFormatter {
    fn default() -> Self {
        Self::new(
            Arc::new(CapturedSymbols),
            DEFAULT_INTERNAL_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        )
    }
}

impl fmt::Debug for StackFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StackFormatter")
            .field("internal_markers", &self.internal_markers)
            .field("stack_types", &self.stack_types.len())
            .finish_non_exhaustive()
    }
}

/// 只保留函数名：去掉模块路径、类型前缀和闭包段
pub fn simplify_function_name(qualified: &str) -> &str {
    let last_path = qualified.rsplit('/').next().unwrap_or(qualified);
    let last_segment = last_path
        .rsplit("::")
        .find(|segment| !segment.is_empty() && !segment.starts_with("{{"))
        .unwrap_or(last_path);
    last_segment.rsplit('.').next().unwrap_or(last_segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{codes, CodeError};

    fn frame(function: &'static str, line: u32) -> Frame {
        Frame::new(Some(function), "src/user.rs", line)
    }

    #[test]
    fn test_simplify_function_name() {
        assert_eq!(simplify_function_name("app::user::UserService::get_user"), "get_user");
        assert_eq!(simplify_function_name("app::handlers::login::{{closure}}"), "login");
        assert_eq!(
            simplify_function_name("<app::Svc as app::api::Api>::create"),
            "create"
        );
        assert_eq!(simplify_function_name("github.com/org/pkg.(*Type).Method"), "Method");
        assert_eq!(simplify_function_name("main"), "main");
    }

    #[test]
    fn test_frame_macro_captures_function_and_location() {
        let captured = frame!();
        let function = captured.function().unwrap();
        assert!(function.ends_with("test_frame_macro_captures_function_and_location"));
        assert!(captured.file().ends_with("stack.rs"));
        assert!(captured.line() > 0);
    }

    #[test]
    fn test_render_outermost_first() {
        let formatter = StackFormatter::default();
        let frames = [
            frame("app::repo::UserRepo::find", 30),
            frame("app::service::UserService::get_user", 20),
            frame("app::api::handle", 10),
        ];

        let rendered = formatter.render("user not found", &frames);

        assert_eq!(
            rendered,
            "Error: user not found | Error trace: handle (src/user.rs:10) -> \
             get_user (src/user.rs:20) -> find (src/user.rs:30)"
        );
    }

    #[test]
    fn test_render_skips_internal_and_unresolved_frames() {
        let formatter = StackFormatter::default();
        let frames = [
            frame("app::repo::find", 30),
            Frame::new(None, "src/unknown.rs", 1),
            frame("tokio::runtime::task::harness::poll", 99),
            frame("app::api::handle", 10),
        ];

        let rendered = formatter.render("boom", &frames);

        assert_eq!(
            rendered,
            "Error: boom | Error trace: handle (src/user.rs:10) -> find (src/user.rs:30)"
        );
    }

    #[test]
    fn test_wrap_accumulates_frames() {
        let inner = traced!("db down");
        let inner_line = inner.stack_frames()[0].line();
        let outer = wrap_traced!(inner, "load user {}", 42);

        assert_eq!(outer.to_string(), "load user 42: db down");
        assert_eq!(outer.stack_frames().len(), 2);
        assert_eq!(outer.stack_frames()[0].line(), inner_line);
        assert!(outer.stack_frames()[1].line() > inner_line);
        assert_eq!(outer.source().unwrap().to_string(), "db down");
    }

    #[test]
    fn test_wrap_plain_error_keeps_source() {
        let err = wrap_traced!(CodeError::new(codes::NO_PERMISSION, "denied"), "check access");

        assert_eq!(err.stack_frames().len(), 1);
        let root = crate::root_cause(&err);
        assert_eq!(root.downcast_ref::<CodeError>().unwrap().code(), codes::NO_PERMISSION);
    }

    #[test]
    fn test_format_traced_error() {
        let formatter = StackFormatter::default();
        let err = traced!("timeout");

        let formatted = formatter.format_error(&err).to_string();

        assert!(formatted.starts_with("Error: timeout | Error trace: test_format_traced_error ("));
    }

    #[test]
    fn test_format_plain_error_is_idempotent() {
        let formatter = StackFormatter::default();
        let err = CodeError::new(codes::ARGS_ERROR, "bad request");

        let first = formatter.format_error(&err).to_string();
        let second = formatter.format_error(&err).to_string();

        assert_eq!(first, "bad request");
        assert_eq!(first, second);
    }

    #[test]
    fn test_trace_report_is_not_formatted_again() {
        let formatter = StackFormatter::default();
        let report = match formatter.format_error(&traced!("timeout")) {
            Formatted::Traced(report) => report,
            Formatted::Plain(_) => panic!("expected traced"),
        };

        let again = formatter.format_error(&report).to_string();

        assert_eq!(again, report.as_str());
    }

    #[derive(Debug)]
    struct ReplayError {
        frames: Vec<Frame>,
    }

    impl fmt::Display for ReplayError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("replay diverged")
        }
    }

    impl StdError for ReplayError {}

    impl StackTrace for ReplayError {
        fn stack_frames(&self) -> &[Frame] {
            &self.frames
        }
    }

    #[test]
    fn test_registered_stack_type_is_rendered() {
        let err = ReplayError {
            frames: vec![frame("app::raft::apply_entry", 12)],
        };

        let plain = StackFormatter::default().format_error(&err).to_string();
        assert_eq!(plain, "replay diverged");

        let formatter = StackFormatter::default().with_stack_type::<ReplayError>();
        assert!(formatter.stack_trace(&err).is_some());
        assert_eq!(
            formatter.format_error(&err).to_string(),
            "Error: replay diverged | Error trace: apply_entry (src/user.rs:12)"
        );
    }

    struct NoSymbols;

    impl SymbolResolver for NoSymbols {
        fn resolve(&self, _frame: &Frame) -> Option<ResolvedFrame> {
            None
        }
    }

    #[test]
    fn test_custom_resolver() {
        let formatter = StackFormatter::default().with_resolver(Arc::new(NoSymbols));
        let rendered = formatter.render("boom", &[frame("app::api::handle", 1)]);
        assert_eq!(rendered, "Error: boom | Error trace: ");
    }
}
