use std::sync::OnceLock;

use kuchiki::traits::*;
use kuchiki::{NodeRef, Selectors};
use regex::Regex;
use thiserror::Error;

use super::css::{parse_declarations, parse_rules, render_declarations, Declaration};

#[derive(Debug, Error)]
pub enum DomError {
    #[error("document has no `{0}` element after parsing")]
    MissingElement(&'static str),
    #[error("could not serialize document: {0}")]
    Serialize(#[from] std::io::Error),
    #[error("serialized document is not valid utf-8")]
    Encoding,
}

/// A stylesheet gap filled by [`augment`] when its detector finds nothing.
pub struct BaselineRule {
    pub name: &'static str,
    detector: &'static str,
    pub css: &'static str,
}

pub const BASELINE_RULES: &[BaselineRule] = &[
    BaselineRule {
        name: "base_font_size",
        detector: r"(?is)body[^{}]*\{[^}]*font-size",
        css: "body{font-size:16px;line-height:1.5;}",
    },
    BaselineRule {
        name: "responsive_images",
        detector: r"(?is)img[^{}]*\{[^}]*max-width",
        css: "img{max-width:100%;height:auto;}",
    },
    BaselineRule {
        name: "mobile_breakpoint",
        detector: r"(?is)@media[^{]*max-width",
        css: "@media only screen and (max-width:620px){table{width:100% !important;}}",
    },
];

fn detectors() -> &'static [(usize, Regex)] {
    static DETECTORS: OnceLock<Vec<(usize, Regex)>> = OnceLock::new();
    DETECTORS.get_or_init(|| {
        BASELINE_RULES
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| Regex::new(rule.detector).ok().map(|regex| (index, regex)))
            .collect()
    })
}

fn parse(html: &str) -> NodeRef {
    kuchiki::parse_html().one(html)
}

fn serialize(document: &NodeRef) -> Result<String, DomError> {
    let mut buffer = Vec::new();
    document.serialize(&mut buffer)?;
    let html = String::from_utf8(buffer).map_err(|_| DomError::Encoding)?;
    if html.trim_start().to_ascii_lowercase().starts_with("<!doctype") {
        Ok(html)
    } else {
        Ok(format!("<!DOCTYPE html>{html}"))
    }
}

/// Parses a snippet and detaches its first `selector` match for grafting.
fn detached(snippet: &str, selector: &'static str) -> Result<NodeRef, DomError> {
    let fragment = parse(snippet);
    let node = fragment
        .select_first(selector)
        .map_err(|_| DomError::MissingElement(selector))?
        .as_node()
        .clone();
    node.detach();
    Ok(node)
}

fn stylesheet_text(document: &NodeRef) -> String {
    match document.select("style") {
        Ok(styles) => styles.map(|style| style.as_node().text_contents()).collect::<Vec<_>>().join("\n"),
        Err(()) => String::new(),
    }
}

/// Pass 7. Fills structural gaps (doctype, charset, viewport, image alt,
/// baseline stylesheet rules). Present values are never modified.
pub fn augment(html: &str) -> Result<(String, Vec<&'static str>), DomError> {
    let document = parse(html);
    let head = document.select_first("head").map_err(|_| DomError::MissingElement("head"))?;
    let head = head.as_node();
    let mut filled = Vec::new();

    if document.select_first("meta[charset]").is_err() {
        head.prepend(detached(r#"<meta charset="UTF-8">"#, "meta")?);
        filled.push("meta_charset");
    }
    if document.select_first(r#"meta[name="viewport"]"#).is_err() {
        let viewport =
            detached(r#"<meta name="viewport" content="width=device-width, initial-scale=1.0">"#, "meta")?;
        match document.select_first("meta[charset]") {
            Ok(charset) => charset.as_node().insert_after(viewport),
            Err(()) => head.prepend(viewport),
        }
        filled.push("meta_viewport");
    }

    if let Ok(images) = document.select("img") {
        for image in images {
            let mut attributes = image.attributes.borrow_mut();
            if !attributes.contains("alt") {
                attributes.insert("alt", String::new());
                filled.push("img_alt");
            }
        }
    }

    let css = stylesheet_text(&document);
    let missing: Vec<&BaselineRule> = detectors()
        .iter()
        .filter(|(_, detector)| !detector.is_match(&css))
        .map(|(index, _)| &BASELINE_RULES[*index])
        .collect();

    if !missing.is_empty() {
        let injected = missing.iter().map(|rule| rule.css).collect::<String>();
        match document.select_first("style") {
            Ok(style) => style.as_node().append(NodeRef::new_text(injected)),
            Err(()) => head.append(detached(&format!("<style>{injected}</style>"), "style")?),
        }
        filled.extend(missing.iter().map(|rule| rule.name));
    }

    Ok((serialize(&document)?, filled))
}

struct InlineRule {
    selectors: Selectors,
    declarations: Vec<Declaration>,
}

fn inlineable(selector: &str) -> bool {
    !selector.contains(':') && !selector.contains('*') && !selector.contains('@')
}

fn collect_inline_rules(css: &str) -> Vec<InlineRule> {
    let mut rules = Vec::new();
    for rule in parse_rules(css).iter().filter(|rule| !rule.is_at_rule()) {
        let declarations = rule.declarations();
        if declarations.is_empty() {
            continue;
        }
        for selector in rule.selectors().filter(|selector| inlineable(selector)) {
            if let Ok(selectors) = Selectors::compile(selector) {
                rules.push(InlineRule { selectors, declarations: declarations.clone() });
            }
        }
    }
    rules
}

/// Pass 8. Copies stylesheet declarations onto matching body elements as
/// inline `style`. Later rules override earlier ones; properties an element
/// already declares inline are left alone. Returns the number of touched elements.
pub fn inline_styles(html: &str) -> Result<(String, usize), DomError> {
    let document = parse(html);
    let rules = collect_inline_rules(&stylesheet_text(&document));
    if rules.is_empty() {
        return Ok((serialize(&document)?, 0));
    }

    let body = document.select_first("body").map_err(|_| DomError::MissingElement("body"))?;
    let mut touched = 0;

    for element in body.as_node().inclusive_descendants().elements() {
        let mut computed: Vec<Declaration> = Vec::new();
        for rule in rules.iter().filter(|rule| rule.selectors.matches(&element)) {
            for declaration in &rule.declarations {
                match computed.iter_mut().find(|seen| seen.property == declaration.property) {
                    Some(seen) => seen.value = declaration.value.clone(),
                    None => computed.push(declaration.clone()),
                }
            }
        }
        if computed.is_empty() {
            continue;
        }

        let mut attributes = element.attributes.borrow_mut();
        let existing = attributes.get("style").unwrap_or_default().trim().to_string();
        let present = parse_declarations(&existing);
        let additions: Vec<Declaration> = computed
            .into_iter()
            .filter(|declaration| !present.iter().any(|seen| seen.property == declaration.property))
            .collect();
        if additions.is_empty() {
            continue;
        }

        let prefix = existing.trim_end_matches(';').trim_end();
        let style = if prefix.is_empty() {
            render_declarations(&additions)
        } else {
            format!("{prefix}; {}", render_declarations(&additions))
        };
        attributes.insert("style", style);
        touched += 1;
    }

    Ok((serialize(&document)?, touched))
}

#[cfg(test)]
mod tests {
    use super::{augment, inline_styles};

    #[test]
    fn augment_fills_missing_head_metadata_and_alt() {
        let (html, filled) =
            augment("<html><head><title>T</title></head><body><img src=\"https://cdn.test/a.png\"></body></html>")
                .expect("augment");

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains(r#"<meta charset="UTF-8">"#));
        assert!(html.contains(r#"name="viewport""#));
        assert!(html.contains(r#"alt="""#));
        assert!(html.contains("body{font-size:16px;line-height:1.5;}"));
        assert!(filled.contains(&"meta_charset"));
        assert!(filled.contains(&"responsive_images"));
    }

    #[test]
    fn augment_keeps_existing_rules_untouched() {
        let source = "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width\"><style>body{font-size:18px}img{max-width:50%}@media (max-width:480px){p{margin:0}}</style></head><body><img src=\"https://cdn.test/a.png\" alt=\"Logo\"></body></html>";
        let (html, filled) = augment(source).expect("augment");

        assert!(filled.is_empty(), "nothing should be filled: {filled:?}");
        assert!(html.contains("body{font-size:18px}"));
        assert!(!html.contains("font-size:16px"));
        assert!(html.contains(r#"alt="Logo""#));
    }

    #[test]
    fn augment_is_a_fixed_point() {
        let (once, _) = augment("<p>hello</p>").expect("first augment");
        let (twice, filled) = augment(&once).expect("second augment");
        assert_eq!(once, twice);
        assert!(filled.is_empty());
    }

    #[test]
    fn inline_styles_copy_class_rules_without_overriding_inline() {
        let source = "<!DOCTYPE html><html><head><style>.cta{background:#16a34a;color:#fff}.cta{color:#000}a:hover{color:red}</style></head><body><a class=\"cta\" style=\"color: #111\">Go</a><p class=\"cta\">x</p></body></html>";
        let (html, touched) = inline_styles(source).expect("inline");

        assert_eq!(touched, 2);
        assert!(html.contains(r#"style="color: #111; background: #16a34a""#));
        assert!(html.contains(r#"<p class="cta" style="background: #16a34a; color: #000">"#));
        assert!(html.contains("<style>"));
    }

    #[test]
    fn inline_styles_is_a_fixed_point() {
        let source = "<!DOCTYPE html><html><head><style>td.hero{padding:24px}</style></head><body><table><tbody><tr><td class=\"hero\">x</td></tr></tbody></table></body></html>";
        let (once, _) = inline_styles(source).expect("first inline");
        let (twice, touched) = inline_styles(&once).expect("second inline");
        assert_eq!(once, twice);
        assert_eq!(touched, 0);
    }
}
