//! Rich-text to plain-text conversion.
//!
//! Walks the RTF group structure, drops ignorable destinations (font and
//! colour tables, embedded pictures, document metadata) and maps the
//! common text-producing control words to their characters. `\'xx` escapes
//! are decoded with the document's `\ansicpg` codepage, Windows-1252 when
//! none is declared.

use encoding_rs::{
    BIG5, EUC_KR, Encoding, GBK, KOI8_R, MACINTOSH, SHIFT_JIS, UTF_8, WINDOWS_874, WINDOWS_1250,
    WINDOWS_1251, WINDOWS_1252, WINDOWS_1253, WINDOWS_1254, WINDOWS_1255, WINDOWS_1256,
    WINDOWS_1257, WINDOWS_1258,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RtfError {
    #[error("content does not start with an RTF header")]
    NotRtf,
    #[error("unbalanced group braces at offset {0}")]
    Unbalanced(usize),
}

const SKIPPED_DESTINATIONS: &[&str] = &[
    "author",
    "buptim",
    "colorschememapping",
    "colortbl",
    "comment",
    "creatim",
    "datastore",
    "doccomm",
    "filetbl",
    "fldinst",
    "fonttbl",
    "footer",
    "footerf",
    "footerl",
    "footerr",
    "generator",
    "header",
    "headerf",
    "headerl",
    "headerr",
    "info",
    "keywords",
    "latentstyles",
    "listoverridetable",
    "listtable",
    "mmathPr",
    "nonshppict",
    "object",
    "operator",
    "pict",
    "printim",
    "revtbl",
    "revtim",
    "rsidtbl",
    "stylesheet",
    "subject",
    "themedata",
    "title",
    "xmlnstbl",
];

#[derive(Debug, Clone, Copy)]
struct GroupState {
    skip: bool,
    unicode_fallback: usize,
}

struct TextSink {
    out: String,
    pending_fallback: usize,
    // consecutive hex-escaped bytes; multi-byte codepages split characters
    // across several escapes
    bytes: Vec<u8>,
    encoding: &'static Encoding,
}

impl TextSink {
    fn accepts(&mut self, state: &GroupState) -> bool {
        if state.skip {
            return false;
        }
        if self.pending_fallback > 0 {
            self.pending_fallback -= 1;
            return false;
        }
        true
    }

    fn push(&mut self, state: &GroupState, ch: char) {
        if self.accepts(state) {
            self.flush();
            self.out.push(ch);
        }
    }

    fn push_byte(&mut self, state: &GroupState, byte: u8) {
        if self.accepts(state) {
            self.bytes.push(byte);
        }
    }

    fn flush(&mut self) {
        if self.bytes.is_empty() {
            return;
        }
        let (text, _) = self.encoding.decode_without_bom_handling(&self.bytes);
        self.out.push_str(&text);
        self.bytes.clear();
    }
}

fn codepage_encoding(codepage: i32) -> Option<&'static Encoding> {
    let encoding = match codepage {
        874 => WINDOWS_874,
        932 => SHIFT_JIS,
        936 => GBK,
        949 => EUC_KR,
        950 => BIG5,
        1250 => WINDOWS_1250,
        1251 => WINDOWS_1251,
        1252 => WINDOWS_1252,
        1253 => WINDOWS_1253,
        1254 => WINDOWS_1254,
        1255 => WINDOWS_1255,
        1256 => WINDOWS_1256,
        1257 => WINDOWS_1257,
        1258 => WINDOWS_1258,
        10000 => MACINTOSH,
        20866 => KOI8_R,
        65001 => UTF_8,
        _ => return None,
    };
    Some(encoding)
}

pub fn rtf_to_text(input: &str) -> Result<String, RtfError> {
    let source = input.trim_start();
    if !source.starts_with("{\\rtf") {
        return Err(RtfError::NotRtf);
    }

    let chars: Vec<char> = source.chars().collect();
    let mut sink = TextSink {
        out: String::with_capacity(chars.len() / 2),
        pending_fallback: 0,
        bytes: Vec::new(),
        encoding: WINDOWS_1252,
    };
    let mut stack: Vec<GroupState> = Vec::new();
    let mut state = GroupState {
        skip: false,
        unicode_fallback: 1,
    };

    let mut i = 0usize;
    while i < chars.len() {
        match chars[i] {
            '{' => {
                stack.push(state);
                i += 1;
            }
            '}' => {
                state = stack.pop().ok_or(RtfError::Unbalanced(i))?;
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else {
                    break;
                };

                if next.is_ascii_alphabetic() {
                    let word_start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let word: String = chars[word_start..i].iter().collect();

                    let param_start = i;
                    if i < chars.len() && chars[i] == '-' {
                        i += 1;
                    }
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let param = if i > param_start {
                        chars[param_start..i]
                            .iter()
                            .collect::<String>()
                            .parse::<i32>()
                            .ok()
                    } else {
                        None
                    };
                    // a single space delimits the control word
                    if i < chars.len() && chars[i] == ' ' {
                        i += 1;
                    }

                    apply_control_word(&word, param, &mut state, &mut sink);
                } else {
                    i += 1;
                    match next {
                        '\\' | '{' | '}' => sink.push(&state, next),
                        '\'' => {
                            let hex: String = chars.iter().skip(i).take(2).collect();
                            if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                                sink.push_byte(&state, byte);
                            }
                            i += hex.chars().count();
                        }
                        '*' => state.skip = true,
                        '~' => sink.push(&state, ' '),
                        '_' => sink.push(&state, '-'),
                        '\n' | '\r' => sink.push(&state, '\n'),
                        _ => {}
                    }
                }
            }
            '\r' | '\n' => i += 1,
            ch => {
                sink.push(&state, ch);
                i += 1;
            }
        }
    }

    if !stack.is_empty() {
        return Err(RtfError::Unbalanced(chars.len()));
    }

    sink.flush();
    Ok(sink.out)
}

fn apply_control_word(word: &str, param: Option<i32>, state: &mut GroupState, sink: &mut TextSink) {
    if SKIPPED_DESTINATIONS.contains(&word) {
        state.skip = true;
        return;
    }

    match word {
        "par" | "line" | "sect" | "page" | "row" => sink.push(state, '\n'),
        "tab" | "cell" => sink.push(state, '\t'),
        "emdash" => sink.push(state, '\u{2014}'),
        "endash" => sink.push(state, '\u{2013}'),
        "lquote" => sink.push(state, '\u{2018}'),
        "rquote" => sink.push(state, '\u{2019}'),
        "ldblquote" => sink.push(state, '\u{201C}'),
        "rdblquote" => sink.push(state, '\u{201D}'),
        "bullet" => sink.push(state, '\u{2022}'),
        "ansicpg" => {
            if let Some(encoding) = param.and_then(codepage_encoding) {
                sink.flush();
                sink.encoding = encoding;
            }
        }
        "uc" => state.unicode_fallback = param.unwrap_or(1).max(0) as usize,
        "u" => {
            if let Some(code) = param {
                let code = if code < 0 { code + 65_536 } else { code };
                if let Some(ch) = char::from_u32(code as u32) {
                    sink.push(state, ch);
                }
                if !state.skip {
                    sink.pending_fallback = state.unicode_fallback;
                }
            }
        }
        _ => {}
    }
}
