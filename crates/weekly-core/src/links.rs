//! Conversion between the markdown link list callers edit and the
//! structured link array the remote store keeps.

use crate::models::LinkEntry;

/// Parse `- [label](url)` / `- url` lines into link entries.
///
/// Blank lines are dropped. A line matching neither form is kept whole as a
/// bare url.
pub fn markdown_to_links(markdown: &str) -> Vec<LinkEntry> {
    markdown
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .filter(|entry| !entry.url.is_empty())
        .collect()
}

fn parse_line(line: &str) -> LinkEntry {
    let body = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .map(str::trim)
        .unwrap_or(line);

    if let Some((label, url)) = parse_labelled(body) {
        let label = label.trim();
        let url = url.trim().to_string();
        let label = if label.is_empty() || label == url {
            None
        } else {
            Some(label.to_string())
        };
        return LinkEntry { label, url };
    }

    LinkEntry {
        label: None,
        url: body.to_string(),
    }
}

/// `[label](url)` with nothing trailing the closing parenthesis.
fn parse_labelled(body: &str) -> Option<(&str, &str)> {
    let rest = body.strip_prefix('[')?;
    let split = rest.find("](")?;
    let label = &rest[..split];
    let url = rest[split + 2..].strip_suffix(')')?;
    Some((label, url))
}

/// Render links as markdown lines. A label equal to its url is omitted.
pub fn links_to_markdown(links: &[LinkEntry]) -> String {
    links
        .iter()
        .filter(|link| !link.url.trim().is_empty())
        .map(|link| match link.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() && label != link.url => {
                format!("- [{}]({})", label, link.url)
            }
            _ => format!("- {}", link.url),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markdown shown for a row's links; `None` when there are none.
pub fn links_markdown_or_none(links: &[LinkEntry]) -> Option<String> {
    let markdown = links_to_markdown(links);
    if markdown.is_empty() {
        None
    } else {
        Some(markdown)
    }
}
