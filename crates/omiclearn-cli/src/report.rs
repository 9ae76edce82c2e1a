//! Self-contained HTML reports: titled sections of maud markup and inline
//! Plotly figures.
use anyhow::{Context, Result};
use maud::{html, Markup, PreEscaped, DOCTYPE};
use plotly::Plot;
use std::path::Path;

use crate::util::write_bytes_to_file;

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.12.1.min.js";

const STYLE: &str = "
body { font-family: Helvetica, Arial, sans-serif; margin: 0; color: #222; }
header { background-color: #2c3e50; color: white; padding: 16px 32px; }
header h1 { margin: 0; font-size: 1.6em; }
header .version { opacity: 0.8; font-size: 0.9em; }
nav { padding: 8px 32px; background-color: #ecf0f1; }
nav a { margin-right: 16px; color: #2c3e50; text-decoration: none; }
section { padding: 16px 32px; border-bottom: 1px solid #ddd; }
table { border-collapse: collapse; margin: 8px 16px 16px 0; display: inline-table; }
th, td { border: 1px solid #ccc; padding: 4px 10px; text-align: right; }
th { background-color: #f5f5f5; }
caption { font-weight: bold; padding-bottom: 4px; }
.note { background-color: #fff8e1; border-left: 4px solid #f0ad4e; padding: 8px 12px; }
.code-container { background-color: #f5f5f5; padding: 10px; border-radius: 5px;
    overflow-x: auto; font-family: monospace; white-space: pre-wrap; }
";

enum Block {
    Content(Markup),
    Plot(String),
}

pub struct ReportSection {
    title: String,
    blocks: Vec<Block>,
}

impl ReportSection {
    pub fn new(title: &str) -> Self {
        ReportSection {
            title: title.to_string(),
            blocks: Vec::new(),
        }
    }

    pub fn add_content(&mut self, content: Markup) {
        self.blocks.push(Block::Content(content));
    }

    pub fn add_plot(&mut self, plot: Plot) {
        self.blocks.push(Block::Plot(plot.to_inline_html(None)));
    }

    fn anchor(&self) -> String {
        self.title
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect()
    }

    fn render(&self) -> Markup {
        html! {
            section id=(self.anchor()) {
                h2 { (self.title) }
                @for block in &self.blocks {
                    @match block {
                        Block::Content(markup) => { div { (markup) } }
                        Block::Plot(inline) => { div class="plot" { (PreEscaped(inline)) } }
                    }
                }
            }
        }
    }
}

pub struct Report {
    name: String,
    version: String,
    title: String,
    sections: Vec<ReportSection>,
}

impl Report {
    pub fn new(name: &str, version: &str, title: &str) -> Self {
        Report {
            name: name.to_string(),
            version: version.to_string(),
            title: title.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn add_section(&mut self, section: ReportSection) {
        self.sections.push(section);
    }

    pub fn render(&self) -> Markup {
        html! {
            (DOCTYPE)
            html lang="en" {
                head {
                    meta charset="utf-8";
                    title { (self.title) }
                    script src=(PLOTLY_CDN) {}
                    style { (PreEscaped(STYLE)) }
                }
                body {
                    header {
                        h1 { (self.title) }
                        span class="version" { (self.name) " " (self.version) }
                    }
                    nav {
                        @for section in &self.sections {
                            a href={ "#" (section.anchor()) } { (section.title) }
                        }
                    }
                    @for section in &self.sections {
                        (section.render())
                    }
                }
            }
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_bytes_to_file(path.as_ref(), self.render().into_string().as_bytes())
            .with_context(|| format!("Failed to write report: {:?}", path.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_are_linked_from_the_nav() {
        let mut report = Report::new("OmicLearn", "0.1.0", "Test report");
        let mut section = ReportSection::new("Confusion matrices");
        section.add_content(html! { p { "a < b" } });
        report.add_section(section);
        let page = report.render().into_string();
        assert!(page.contains(r##"href="#confusion-matrices""##));
        assert!(page.contains(r#"id="confusion-matrices""#));
        assert!(page.contains("a &lt; b"));
        assert!(page.contains(PLOTLY_CDN));
    }
}
