//! Just enough CSS parsing to inline simple rules and detect baseline ones.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

/// A top-level style rule. At-rules are reported with their full prelude and
/// raw block so callers can skip them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CssRule {
    pub prelude: String,
    pub block: String,
}

impl CssRule {
    pub fn is_at_rule(&self) -> bool {
        self.prelude.starts_with('@')
    }

    pub fn selectors(&self) -> impl Iterator<Item = &str> {
        self.prelude.split(',').map(str::trim).filter(|selector| !selector.is_empty())
    }

    pub fn declarations(&self) -> Vec<Declaration> {
        parse_declarations(&self.block)
    }
}

pub fn strip_comments(css: &str) -> String {
    let mut output = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        output.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => return output,
        }
    }
    output.push_str(rest);
    output
}

/// Splits a stylesheet into top-level `prelude { block }` pairs, tracking
/// brace depth so nested at-rule blocks stay intact.
pub fn parse_rules(css: &str) -> Vec<CssRule> {
    let css = strip_comments(css);
    let mut rules = Vec::new();
    let mut depth = 0usize;
    let mut prelude_start = 0usize;
    let mut block_start = 0usize;
    let mut prelude = String::new();

    for (index, ch) in css.char_indices() {
        match ch {
            '{' => {
                if depth == 0 {
                    prelude = css[prelude_start..index].trim().to_string();
                    block_start = index + 1;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    rules.push(CssRule {
                        prelude: std::mem::take(&mut prelude),
                        block: css[block_start..index].trim().to_string(),
                    });
                    prelude_start = index + 1;
                }
            }
            ';' if depth == 0 => {
                // `@import ...;` and friends carry no block.
                prelude_start = index + 1;
            }
            _ => {}
        }
    }

    rules
}

pub fn parse_declarations(block: &str) -> Vec<Declaration> {
    block
        .split(';')
        .filter_map(|chunk| {
            let (property, value) = chunk.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if property.is_empty() || value.is_empty() {
                return None;
            }
            Some(Declaration { property, value: value.to_string() })
        })
        .collect()
}

pub fn render_declarations(declarations: &[Declaration]) -> String {
    declarations
        .iter()
        .map(|declaration| format!("{}: {}", declaration.property, declaration.value))
        .collect::<Vec<_>>()
        .join("; ")
}
