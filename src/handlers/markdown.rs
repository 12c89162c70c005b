use crate::{
    errors::{AppError, AppResult},
    ops::{
        registry::{Args, OperationHandler},
        types::{OperationKind, Outcome, PathParam},
    },
    sandbox::{PathGuard, PathIntent},
};
use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};

const PATH_PARAMS: &[PathParam] = &[PathParam { name: "file_path", intent: PathIntent::Existing }];

pub struct MarkdownRenderer;

pub fn render(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[async_trait]
impl OperationHandler for MarkdownRenderer {
    fn kind(&self) -> OperationKind { OperationKind::ConvertMarkdown }
    fn path_params(&self) -> &'static [PathParam] { PATH_PARAMS }

    async fn execute(&self, guard: &PathGuard, args: Args) -> AppResult<Outcome> {
        let source = args.path("file_path")?;
        if source.extension().is_some_and(|e| e.eq_ignore_ascii_case("html")) {
            return Err(AppError::InvalidArgument("source already has an html extension".into()));
        }
        let raw = tokio::fs::read(source.as_path()).await.map_err(AppError::from_read)?;
        let html = render(&String::from_utf8_lossy(&raw));

        let target = guard.validate_derived(source.with_extension("html"))?;
        tokio::fs::write(target.as_path(), html).await.map_err(|e| AppError::WriteFailed(e.to_string()))?;
        tracing::debug!(source = %source, output = %target, "markdown rendered");
        Ok(Outcome::Written { message: "Markdown converted to HTML", field: "html_file", path: target })
    }
}
