use super::*;
use crate::language::lexer::lex_lossy;

/// One completion request inside a macro argument. `argument` is the text
/// between the invocation's delimiters and `caret` a byte offset into it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub macro_name: String,
    pub argument: String,
    pub caret: usize,
    pub scope: ScopeHandle,
}

impl Invocation {
    pub fn new(
        macro_name: impl Into<String>,
        argument: impl Into<String>,
        caret: usize,
        scope: ScopeHandle,
    ) -> Self {
        let argument = argument.into();
        let caret = caret.min(argument.len());
        Self {
            macro_name: macro_name.into(),
            argument,
            caret,
            scope,
        }
    }

    pub fn segment(&self) -> Result<Segmentation, SegmentError> {
        segment(&self.argument, self.caret)
    }
}

/// The argument split at the caret. `pre_caret` holds every complete token
/// before the caret, delimiters included; the partially typed word under
/// the caret is kept apart as `caret_token`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segmentation {
    pub pre_caret: Vec<Token>,
    pub caret_token: Option<Token>,
    pub prefix: String,
    /// Indices into `pre_caret` of the groups still open at the caret,
    /// outermost first.
    pub open_groups: Vec<usize>,
}

impl Segmentation {
    /// The caret as a token index into `pre_caret`.
    pub fn caret_index(&self) -> usize {
        self.pre_caret.len()
    }

    pub fn depth(&self) -> usize {
        self.open_groups.len()
    }

    pub fn local_start(&self) -> usize {
        self.open_groups.last().map(|idx| idx + 1).unwrap_or(0)
    }

    /// Tokens of the innermost open group up to the caret.
    pub fn local_tokens(&self) -> &[Token] {
        &self.pre_caret[self.local_start()..]
    }

    /// The caret as a token index into `local_tokens()`.
    pub fn local_offset(&self) -> usize {
        self.caret_index() - self.local_start()
    }

    pub fn prefix(&self) -> Option<&str> {
        if self.prefix.is_empty() {
            None
        } else {
            Some(&self.prefix)
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    #[error("malformed argument before the caret: {0}")]
    Malformed(String),
    #[error("caret is inside a string or character literal")]
    CaretInLiteral,
}

pub fn segment(argument: &str, caret: usize) -> Result<Segmentation, SegmentError> {
    let caret = caret.min(argument.len());
    let (tokens, errors) = lex_lossy(argument);
    if let Some(err) = errors.iter().find(|err| err.span.start < caret) {
        let opens_literal = argument
            .get(err.span.start..)
            .is_some_and(|rest| rest.starts_with(['"', '\'', 'b', 'r']));
        if err.span.end >= caret && opens_literal {
            return Err(SegmentError::CaretInLiteral);
        }
        return Err(SegmentError::Malformed(err.message.clone()));
    }

    let mut segmentation = Segmentation::default();
    for token in tokens {
        if token.span.start >= caret {
            break;
        }
        let touches_caret = token.span.end > caret
            || (token.span.end == caret && token.kind.is_word_like());
        if !touches_caret {
            segmentation.pre_caret.push(token);
            continue;
        }
        if token.kind.is_word_like() {
            segmentation.prefix = argument
                .get(token.span.start..caret)
                .unwrap_or_default()
                .to_string();
            segmentation.caret_token = Some(token);
        } else if token.kind.is_literal() {
            return Err(SegmentError::CaretInLiteral);
        }
        break;
    }

    for (idx, token) in segmentation.pre_caret.iter().enumerate() {
        if token.kind.open_delimiter().is_some() {
            segmentation.open_groups.push(idx);
        } else if let Some(close) = token.kind.close_delimiter() {
            let Some(open_idx) = segmentation.open_groups.pop() else {
                return Err(SegmentError::Malformed(format!(
                    "unbalanced `{}` at byte {}",
                    token.kind, token.span.start
                )));
            };
            let open = &segmentation.pre_caret[open_idx];
            if open.kind.open_delimiter() != Some(close) {
                return Err(SegmentError::Malformed(format!(
                    "`{}` at byte {} does not close `{}`",
                    token.kind, token.span.start, open.kind
                )));
            }
        }
    }
    Ok(segmentation)
}
