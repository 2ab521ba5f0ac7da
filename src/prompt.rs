//! Prompt detection for interactive device shells.
//!
//! Every line (and the trailing partial line) read from a shell is classified
//! into a [`LineState`]. Pagination markers, rejected-command messages and the
//! two prompt views of a dialect are compiled into one [`RegexSet`]; the first
//! matching pattern wins, in that order.

use std::collections::HashMap;

use log::trace;
use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use crate::dialect::{PromptPatterns, Vendor};
use crate::error::ConnectError;

/// Classification of one line of shell output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineState {
    Output,
    More,
    Error,
    /// `<host>`, `host>` or `host#`
    UserView,
    /// `[host]` or `host(config)#`
    ConfigView,
}

impl LineState {
    pub fn is_prompt(&self) -> bool {
        matches!(self, LineState::UserView | LineState::ConfigView)
    }
}

pub struct PromptMatcher {
    /// Combined regex set for matching all line patterns
    all_regex: RegexSet,

    /// Maps regex match index to line state
    regex_index_map: HashMap<usize, LineState>,

    /// State of the last line read
    state: LineState,

    /// Last prompt text seen
    current_prompt: Option<String>,

    /// Whether an error line was seen since the last reset
    saw_error: bool,
}

/// Carriage returns and backspaces some devices emit before redrawing a line.
pub static IGNORE_START_LINE: Lazy<Regex> =
    Lazy::new(
        || match Regex::new(r"^(\r+(\s+\r+)*)|(\u{8}+(\s+\u{8}+)*)") {
            Ok(re) => re,
            Err(err) => panic!("invalid IGNORE_START_LINE regex: {err}"),
        },
    );

/// ANSI cursor movement sequences that follow pagination prompts.
pub static ANSI_ESCAPE: Lazy<Regex> =
    Lazy::new(|| match Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]") {
        Ok(re) => re,
        Err(err) => panic!("invalid ANSI_ESCAPE regex: {err}"),
    });

impl PromptMatcher {
    /// Builds a matcher for a vendor's prompt conventions.
    pub fn for_vendor(vendor: Vendor) -> Result<Self, ConnectError> {
        Self::new(vendor.prompts())
    }

    pub fn new(patterns: &PromptPatterns) -> Result<Self, ConnectError> {
        let mut regexs: Vec<String> = Vec::new();
        let mut regex_index_map = HashMap::new();

        let groups: [(&[&str], LineState, bool); 4] = [
            (patterns.more, LineState::More, false),
            (patterns.error, LineState::Error, false),
            (patterns.config, LineState::ConfigView, true),
            (patterns.user, LineState::UserView, true),
        ];

        for (group, state, is_prompt) in groups {
            for pattern in group {
                let pattern = if is_prompt {
                    // Prompts may be preceded by NULs and a lone carriage return.
                    format!(r"^\x00*\r{{0,1}}{}", pattern.trim_start_matches('^'))
                } else {
                    pattern.to_string()
                };
                regex_index_map.insert(regexs.len(), state);
                regexs.push(pattern);
            }
        }

        let all_regex = RegexSet::new(&regexs).map_err(|err| {
            ConnectError::InvalidPattern(format!("failed to build prompt regex set: {err}"))
        })?;

        Ok(Self {
            all_regex,
            regex_index_map,
            state: LineState::Output,
            current_prompt: None,
            saw_error: false,
        })
    }

    /// Classifies a line without changing matcher state.
    pub fn classify(&self, line: &str) -> LineState {
        let cleaned = ANSI_ESCAPE.replace_all(line, "");
        self.all_regex
            .matches(&cleaned)
            .into_iter()
            .next()
            .and_then(|index| self.regex_index_map.get(&index).copied())
            .unwrap_or(LineState::Output)
    }

    /// Reads a line of output and updates the current state.
    pub fn read(&mut self, line: &str) {
        let state = self.classify(line);
        trace!("Read line: '{:?}' => {:?}", line, state);
        if state.is_prompt() {
            self.current_prompt = Some(line.trim().to_string());
        }
        if state == LineState::Error {
            self.saw_error = true;
        }
        self.state = state;
    }

    /// Checks whether a (possibly partial) line is a prompt.
    pub fn read_prompt(&self, line: &str) -> bool {
        self.classify(line).is_prompt()
    }

    /// Input to send when a line asks for it. Pagination prompts get a space.
    pub fn read_need_write(&self, line: &str) -> Option<&'static str> {
        match self.classify(line) {
            LineState::More => Some(" "),
            _ => None,
        }
    }

    /// Clears the error flag before a new command.
    pub fn reset(&mut self) {
        self.saw_error = false;
    }

    /// An error line was read since the last [`reset`](Self::reset).
    pub fn error(&self) -> bool {
        self.saw_error
    }

    pub fn current_state(&self) -> LineState {
        self.state
    }

    pub fn current_prompt(&self) -> Option<&str> {
        self.current_prompt.as_deref()
    }

    /// The last prompt seen was a configuration view.
    pub fn in_config_view(&self) -> bool {
        self.current_prompt
            .as_deref()
            .is_some_and(|p| self.classify(p) == LineState::ConfigView)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huawei_views_are_classified() {
        let matcher = PromptMatcher::for_vendor(Vendor::Huawei).expect("matcher");
        assert_eq!(matcher.classify("<core-1>"), LineState::UserView);
        assert_eq!(matcher.classify("[core-1]"), LineState::ConfigView);
        assert_eq!(matcher.classify("[core-1-GigabitEthernet0/0/1]"), LineState::ConfigView);
        assert_eq!(matcher.classify("  ---- More ----"), LineState::More);
        assert_eq!(
            matcher.classify("Error: Unrecognized command found at '^' position."),
            LineState::Error
        );
        assert_eq!(matcher.classify("sysname core-1"), LineState::Output);
    }

    #[test]
    fn cisco_views_are_classified() {
        let matcher = PromptMatcher::for_vendor(Vendor::CiscoIos).expect("matcher");
        assert_eq!(matcher.classify("sw1>"), LineState::UserView);
        assert_eq!(matcher.classify("sw1#"), LineState::UserView);
        assert_eq!(matcher.classify("sw1(config)#"), LineState::ConfigView);
        assert_eq!(matcher.classify("sw1(config-if)# "), LineState::ConfigView);
        assert_eq!(matcher.classify(" --More-- "), LineState::More);
        assert_eq!(
            matcher.classify("% Invalid input detected at '^' marker."),
            LineState::Error
        );
    }

    #[test]
    fn prompt_after_carriage_return_is_detected() {
        let matcher = PromptMatcher::for_vendor(Vendor::Huawei).expect("matcher");
        assert!(matcher.read_prompt("\r<core-1>"));
        assert!(matcher.read_prompt("\x00\x00<core-1>"));
    }

    #[test]
    fn more_prompt_with_ansi_tail_requests_space() {
        let matcher = PromptMatcher::for_vendor(Vendor::Huawei).expect("matcher");
        assert_eq!(matcher.read_need_write("  ---- More ----\x1b[42D"), Some(" "));
        assert_eq!(matcher.read_need_write("<core-1>"), None);
    }

    #[test]
    fn read_tracks_prompt_and_error_flag() {
        let mut matcher = PromptMatcher::for_vendor(Vendor::Huawei).expect("matcher");
        matcher.read("Error: Wrong parameter found at '^' position.");
        assert!(matcher.error());
        matcher.read("[core-1]");
        assert_eq!(matcher.current_prompt(), Some("[core-1]"));
        assert!(matcher.in_config_view());
        matcher.reset();
        assert!(!matcher.error());
        matcher.read("<core-1>");
        assert!(!matcher.in_config_view());
    }

    #[test]
    fn invalid_pattern_returns_config_error() {
        let patterns = PromptPatterns {
            user: &["["],
            config: &[],
            more: &[],
            error: &[],
            disable_paging: "",
            logout: "",
        };
        match PromptMatcher::new(&patterns) {
            Ok(_) => panic!("invalid regex should fail matcher construction"),
            Err(ConnectError::InvalidPattern(msg)) => {
                assert!(msg.contains("failed to build prompt regex set"))
            }
            Err(other) => panic!("unexpected error type: {other}"),
        }
    }
}
