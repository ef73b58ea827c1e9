// entities.rs — entity lump parsing
//
// The entity lump is a sequence of `{ "key" "value" ... }` blocks. Broken
// blocks are dropped with a warning and parsing resumes at the next `{`.

use thiserror::Error;

use bspview_common::mathlib::Vec3;
use bspview_common::parse::{Token, Tokenizer};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityFault {
    #[error("block is missing its closing brace")]
    MissingCloseBrace,

    #[error("key \"{key}\" has no value")]
    OddTokenCount { key: String },

    #[error("unexpected \"{token}\" outside a block")]
    StrayToken { token: String },
}

/// A malformed entity block. The block is skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("entity text line {line}: {fault}")]
pub struct EntityParseWarning {
    /// Line the problem was detected on.
    pub line: usize,
    pub fault: EntityFault,
}

/// One entity: its key/value pairs in file order. A repeated key keeps its
/// first position and takes the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityRecord {
    pairs: Vec<(String, String)>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.pairs.push((key.to_string(), value.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn class_name(&self) -> Option<&str> {
        self.get("classname")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    fn vector(&self, key: &str) -> Option<Vec3> {
        let mut parts = self.get(key)?.split_whitespace().map(|p| p.parse::<f32>());
        let v = [parts.next()?.ok()?, parts.next()?.ok()?, parts.next()?.ok()?];
        Some(v)
    }

    pub fn origin(&self) -> Option<Vec3> {
        self.vector("origin")
    }

    /// Pitch, yaw, roll. A lone "angle" key is a yaw.
    pub fn angles(&self) -> Option<Vec3> {
        self.vector("angles").or_else(|| {
            let yaw = self.get("angle")?.trim().parse::<f32>().ok()?;
            Some([0.0, yaw, 0.0])
        })
    }

    /// Inline brush model referenced as "*N".
    pub fn model_index(&self) -> Option<usize> {
        self.get("model")?.strip_prefix('*')?.parse().ok()
    }
}

/// Parse the entity text into records plus a warning per dropped block.
pub fn parse_entities(text: &str) -> (Vec<EntityRecord>, Vec<EntityParseWarning>) {
    let mut tokens = Tokenizer::new(text);
    let mut records = Vec::new();
    let mut warnings = Vec::new();

    let mut next = tokens.next();
    while let Some(token) = next {
        match token {
            Token::OpenBrace => {
                next = parse_block(&mut tokens, &mut records, &mut warnings);
            }
            Token::CloseBrace | Token::Quoted(_) | Token::Word(_) => {
                // one warning for the whole run, up to the next block
                warnings.push(EntityParseWarning {
                    line: tokens.line(),
                    fault: EntityFault::StrayToken {
                        token: token.text().unwrap_or("}").to_string(),
                    },
                });
                next = tokens.find(|t| matches!(t, Token::OpenBrace));
            }
        }
    }

    (records, warnings)
}

/// Parse one block after its `{`. Returns the token that follows it, which
/// is the `{` of the next block when this one was left open.
fn parse_block<'a>(
    tokens: &mut Tokenizer<'a>,
    records: &mut Vec<EntityRecord>,
    warnings: &mut Vec<EntityParseWarning>,
) -> Option<Token<'a>> {
    let mut record = EntityRecord::new();
    let mut key: Option<&str> = None;

    loop {
        match tokens.next() {
            Some(Token::CloseBrace) => {
                match key {
                    Some(k) => warnings.push(EntityParseWarning {
                        line: tokens.line(),
                        fault: EntityFault::OddTokenCount { key: k.to_string() },
                    }),
                    None => records.push(record),
                }
                return tokens.next();
            }
            open @ Some(Token::OpenBrace) => {
                warnings.push(EntityParseWarning {
                    line: tokens.line(),
                    fault: EntityFault::MissingCloseBrace,
                });
                return open;
            }
            None => {
                warnings.push(EntityParseWarning {
                    line: tokens.line(),
                    fault: EntityFault::MissingCloseBrace,
                });
                return None;
            }
            Some(Token::Quoted(text)) | Some(Token::Word(text)) => match key.take() {
                Some(k) => record.insert(k, text),
                None => key = Some(text),
            },
        }
    }
}
