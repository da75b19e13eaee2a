//! HTML to markdown conversion

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("Invalid title selector"));

static BODY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("body").expect("Invalid body selector"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static BLANK_LINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("Invalid blank line regex"));

/// Elements whose content never belongs to the article text
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "nav", "header", "footer", "iframe", "svg", "form",
    "button", "template", "head",
];

/// Text of the `<title>` element, whitespace collapsed
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title = document.select(&TITLE_SELECTOR).next()?;
    let text = WHITESPACE
        .replace_all(&title.text().collect::<String>(), " ")
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

/// Convert an HTML document or fragment to markdown
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut output = String::new();

    match document.select(&BODY_SELECTOR).next() {
        Some(body) => convert_children(&body, &mut output),
        None => convert_children(&document.root_element(), &mut output),
    }

    tidy(&output)
}

fn convert_children(element: &ElementRef, output: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                let collapsed = WHITESPACE.replace_all(text, " ");
                // Avoid stacking spaces across sibling text nodes
                if collapsed == " " && (output.is_empty() || output.ends_with(&[' ', '\n'][..])) {
                    continue;
                }
                output.push_str(&collapsed);
            }
            Node::Element(_) => {
                if let Some(elem) = ElementRef::wrap(child) {
                    convert_element(&elem, output);
                }
            }
            _ => {}
        }
    }
}

fn convert_element(elem: &ElementRef, output: &mut String) {
    let name = elem.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }

    match name {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            output.push_str("\n\n");
            output.push_str(&"#".repeat(level));
            output.push(' ');
            let mut inner = String::new();
            convert_children(elem, &mut inner);
            output.push_str(inner.trim());
            output.push_str("\n\n");
        }
        "p" | "div" | "section" | "article" | "main" | "aside" | "figure" => {
            output.push_str("\n\n");
            convert_children(elem, output);
            output.push_str("\n\n");
        }
        "br" => output.push('\n'),
        "hr" => output.push_str("\n\n---\n\n"),
        "strong" | "b" => wrap_inline(elem, output, "**"),
        "em" | "i" => wrap_inline(elem, output, "*"),
        "code" => wrap_inline(elem, output, "`"),
        "pre" => {
            let code: String = elem.text().collect();
            output.push_str("\n\n```\n");
            output.push_str(code.trim_matches('\n'));
            output.push_str("\n```\n\n");
        }
        "blockquote" => {
            let mut inner = String::new();
            convert_children(elem, &mut inner);
            output.push_str("\n\n");
            for line in tidy(&inner).lines() {
                output.push_str("> ");
                output.push_str(line);
                output.push('\n');
            }
            output.push('\n');
        }
        "a" => {
            let mut inner = String::new();
            convert_children(elem, &mut inner);
            let text = inner.trim();
            match elem.value().attr("href") {
                Some(href) if !href.starts_with("javascript:") && !text.is_empty() => {
                    output.push('[');
                    output.push_str(text);
                    output.push_str("](");
                    output.push_str(href);
                    output.push(')');
                }
                _ => output.push_str(text),
            }
        }
        "img" => {
            if let Some(alt) = elem.value().attr("alt").filter(|a| !a.trim().is_empty()) {
                let src = elem.value().attr("src").unwrap_or("");
                output.push_str(&format!("![{}]({})", alt.trim(), src));
            }
        }
        "ul" | "ol" => convert_list(elem, output, name == "ol"),
        "table" => convert_table(elem, output),
        _ => convert_children(elem, output),
    }
}

fn wrap_inline(elem: &ElementRef, output: &mut String, marker: &str) {
    let mut inner = String::new();
    convert_children(elem, &mut inner);
    let text = inner.trim();
    if text.is_empty() {
        return;
    }
    output.push_str(marker);
    output.push_str(text);
    output.push_str(marker);
}

fn convert_list(elem: &ElementRef, output: &mut String, ordered: bool) {
    output.push_str("\n\n");
    let items = elem
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "li");

    for (index, item) in items.enumerate() {
        let mut inner = String::new();
        convert_children(&item, &mut inner);
        let text = WHITESPACE.replace_all(inner.trim(), " ");
        if ordered {
            output.push_str(&format!("{}. ", index + 1));
        } else {
            output.push_str("- ");
        }
        output.push_str(&text);
        output.push('\n');
    }
    output.push('\n');
}

fn convert_table(elem: &ElementRef, output: &mut String) {
    output.push_str("\n\n");
    let rows = elem
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "tr");

    for (index, row) in rows.enumerate() {
        let cells: Vec<String> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "td" | "th"))
            .map(|cell| {
                let mut inner = String::new();
                convert_children(&cell, &mut inner);
                WHITESPACE.replace_all(inner.trim(), " ").replace('|', "\\|")
            })
            .collect();
        if cells.is_empty() {
            continue;
        }

        output.push_str("| ");
        output.push_str(&cells.join(" | "));
        output.push_str(" |\n");
        if index == 0 {
            output.push_str(&format!("|{}\n", " --- |".repeat(cells.len())));
        }
    }
    output.push('\n');
}

/// Trim lines, collapse inner spaces and blank line runs; fenced code is kept verbatim
fn tidy(markdown: &str) -> String {
    let mut lines = Vec::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            lines.push(line.trim().to_string());
        } else if in_fence {
            lines.push(line.to_string());
        } else {
            lines.push(WHITESPACE.replace_all(line.trim(), " ").into_owned());
        }
    }

    BLANK_LINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_conversion() {
        let html = r#"
            <h1>Main Title</h1>
            <p>This is a <strong>bold</strong> and <em>italic</em> paragraph.</p>
            <h2>Subtitle</h2>
            <ul>
                <li>Item 1</li>
                <li>Item 2</li>
            </ul>
            <ol><li>First</li><li>Second</li></ol>
            <p>Link to <a href="https://example.com">example</a>.</p>
        "#;

        let markdown = html_to_markdown(html);

        assert!(markdown.contains("# Main Title"));
        assert!(markdown.contains("This is a **bold** and *italic* paragraph."));
        assert!(markdown.contains("## Subtitle"));
        assert!(markdown.contains("- Item 1\n- Item 2"));
        assert!(markdown.contains("1. First\n2. Second"));
        assert!(markdown.contains("[example](https://example.com)"));
    }

    #[test]
    fn test_skips_boilerplate() {
        let html = r#"
            <html><head><title>t</title><style>body { color: red; }</style></head>
            <body>
                <nav><a href="/">Home</a></nav>
                <script>var tracking = 1;</script>
                <p>കേരളം ഇന്ത്യയിലെ ഒരു സംസ്ഥാനമാണ്.</p>
                <footer>Copyright</footer>
            </body></html>
        "#;

        let markdown = html_to_markdown(html);
        assert_eq!(markdown, "കേരളം ഇന്ത്യയിലെ ഒരു സംസ്ഥാനമാണ്.");
    }

    #[test]
    fn test_preformatted_text_is_fenced() {
        let html = "<pre>fn main() {\n    println!(\"hi\");\n}</pre>";
        let markdown = html_to_markdown(html);
        assert!(markdown.contains("```\nfn main() {\n    println!(\"hi\");\n}\n```"));
    }

    #[test]
    fn test_table_conversion() {
        let html = "<table><tr><th>ജില്ല</th><th>Code</th></tr><tr><td>എറണാകുളം</td><td>EKM</td></tr></table>";
        let markdown = html_to_markdown(html);
        assert!(markdown.contains("| ജില്ല | Code |\n| --- | --- |\n| എറണാകുളം | EKM |"));
    }

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title>\n  മാതൃഭൂമി   വാർത്ത \n</title></head><body></body></html>";
        assert_eq!(extract_title(html), Some("മാതൃഭൂമി വാർത്ത".to_string()));
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_empty_document() {
        assert_eq!(html_to_markdown(""), "");
        assert_eq!(html_to_markdown("<script>only()</script>"), "");
    }
}
