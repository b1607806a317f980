use std::fmt;

/// An error raised while tokenizing BASIC source.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub line: u32,
    pub message: String,
}

impl LexError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        LexError {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lex error: line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for LexError {}

/// An error raised while parsing the token stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

impl ParseError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error: line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// An error raised while resolving jump targets and extracting subroutines.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveError {
    UnresolvedLabel { target: u16, site: Option<u16> },
    DuplicateLabel { label: u16 },
    ReturnOutsideSubroutine { line: Option<u16> },
    SubroutineWithoutReturn { label: u16 },
    OverlappingSubroutines { first: u16, second: u16 },
    CrossBoundaryJump { target: u16, site: Option<u16> },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn at(site: &Option<u16>) -> String {
            match site {
                Some(line) => format!(" at line {}", line),
                None => String::new(),
            }
        }
        match self {
            ResolveError::UnresolvedLabel { target, site } => {
                write!(f, "resolve error: unresolved label {}{}", target, at(site))
            }
            ResolveError::DuplicateLabel { label } => {
                write!(f, "resolve error: duplicate line number {}", label)
            }
            ResolveError::ReturnOutsideSubroutine { line } => {
                write!(f, "resolve error: RETURN outside a subroutine{}", at(line))
            }
            ResolveError::SubroutineWithoutReturn { label } => {
                write!(f, "resolve error: subroutine {} has no RETURN", label)
            }
            ResolveError::OverlappingSubroutines { first, second } => {
                write!(
                    f,
                    "resolve error: subroutines {} and {} overlap",
                    first, second
                )
            }
            ResolveError::CrossBoundaryJump { target, site } => {
                write!(
                    f,
                    "resolve error: GOTO {}{} crosses a subroutine boundary",
                    target,
                    at(site)
                )
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// An error raised when a jump does not fit any structuring rewrite.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureError {
    pub target: u16,
    pub site: Option<u16>,
    pub message: String,
}

impl fmt::Display for StructureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "structure error: {} (GOTO {}", self.message, self.target)?;
        if let Some(line) = self.site {
            write!(f, " at line {}", line)?;
        }
        write!(f, ")")
    }
}

impl std::error::Error for StructureError {}

/// Any error produced by the transpiler pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Resolve(ResolveError),
    Structure(StructureError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "{}", e),
            CompileError::Parse(e) => write!(f, "{}", e),
            CompileError::Resolve(e) => write!(f, "{}", e),
            CompileError::Structure(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<ResolveError> for CompileError {
    fn from(e: ResolveError) -> Self {
        CompileError::Resolve(e)
    }
}

impl From<StructureError> for CompileError {
    fn from(e: StructureError) -> Self {
        CompileError::Structure(e)
    }
}
