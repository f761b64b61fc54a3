//! Engine stdout protocol.
//!
//! The engine writes free-form diagnostic lines interleaved with named event
//! blocks:
//!
//! ```text
//! loading wind data                  <- diagnostic
//! ---results                         <- opens event "results"
//! {"path": [ ... ],                  <- payload
//!  "stats": { ... }}                 <- payload
//! ---                                <- closes the event
//! ```
//!
//! A marker line opens an event when none is open and closes it otherwise,
//! whatever follows the marker. Payload lines are concatenated verbatim,
//! without separators.

pub const EVENT_MARKER: &str = "---";

/// Event carrying the final route.
pub const RESULTS_EVENT: &str = "results";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub name: String,
    pub payload: String,
}

impl EngineEvent {
    /// Payload size in kilobytes, for logging.
    pub fn size_kb(&self) -> f64 {
        self.payload.len() as f64 / 1024.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    InEvent { name: String, payload: String },
}

/// What a single line amounted to.
#[derive(Debug, PartialEq, Eq)]
pub enum ParsedLine<'a> {
    Diagnostic(&'a str),
    Opened { name: String },
    Payload,
    Closed(EngineEvent),
}

#[derive(Debug)]
pub struct EventParser {
    state: ParserState,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Idle,
        }
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Feed one line, without its trailing newline.
    pub fn feed_line<'a>(&mut self, line: &'a str) -> ParsedLine<'a> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let state = std::mem::replace(&mut self.state, ParserState::Idle);

        match (state, line.strip_prefix(EVENT_MARKER)) {
            (ParserState::Idle, Some(name)) => {
                let name = name.trim().to_string();
                self.state = ParserState::InEvent {
                    name: name.clone(),
                    payload: String::new(),
                };
                ParsedLine::Opened { name }
            }
            (ParserState::InEvent { name, payload }, Some(_)) => {
                ParsedLine::Closed(EngineEvent { name, payload })
            }
            (ParserState::Idle, None) => ParsedLine::Diagnostic(line),
            (ParserState::InEvent { name, mut payload }, None) => {
                payload.push_str(line);
                self.state = ParserState::InEvent { name, payload };
                ParsedLine::Payload
            }
        }
    }

    /// End of output. Returns the event left open, if any.
    pub fn finish(self) -> Option<EngineEvent> {
        match self.state {
            ParserState::Idle => None,
            ParserState::InEvent { name, payload } => Some(EngineEvent { name, payload }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(lines: &[&str]) -> (Vec<EngineEvent>, Vec<String>, EventParser) {
        let mut parser = EventParser::new();
        let mut events = Vec::new();
        let mut diagnostics = Vec::new();
        for line in lines {
            match parser.feed_line(line) {
                ParsedLine::Closed(event) => events.push(event),
                ParsedLine::Diagnostic(text) => diagnostics.push(text.to_string()),
                ParsedLine::Opened { .. } | ParsedLine::Payload => {}
            }
        }
        (events, diagnostics, parser)
    }

    #[test]
    fn test_single_event_with_diagnostics() {
        let (events, diagnostics, parser) = feed_all(&[
            "loading",
            "---results",
            "{\"path\": [],",
            " \"stats\": {}}",
            "---",
            "bye",
        ]);
        assert_eq!(
            events,
            vec![EngineEvent {
                name: "results".to_string(),
                payload: "{\"path\": [], \"stats\": {}}".to_string(),
            }]
        );
        assert_eq!(diagnostics, vec!["loading", "bye"]);
        assert!(parser.finish().is_none());
    }

    #[test]
    fn test_marker_closes_regardless_of_suffix() {
        // The third marker opens a fresh event rather than being ignored.
        let (events, _, parser) = feed_all(&["---a", "1", "---b", "---c", "2"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "a");
        assert_eq!(events[0].payload, "1");
        assert_eq!(
            parser.state(),
            &ParserState::InEvent {
                name: "c".to_string(),
                payload: "2".to_string()
            }
        );
    }

    #[test]
    fn test_consecutive_events() {
        let (events, _, _) = feed_all(&["---progress", "50", "---", "---results", "{}", "---"]);
        let names: Vec<_> = events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["progress", "results"]);
        assert_eq!(events[1].payload, "{}");
    }

    #[test]
    fn test_empty_event_and_crlf() {
        let (events, _, _) = feed_all(&["---results\r", "---\r"]);
        assert_eq!(
            events,
            vec![EngineEvent {
                name: "results".to_string(),
                payload: String::new(),
            }]
        );
    }

    #[test]
    fn test_unterminated_event_returned_by_finish() {
        let (events, _, parser) = feed_all(&["---results", "{\"path\""]);
        assert!(events.is_empty());
        let open = parser.finish().unwrap();
        assert_eq!(open.name, "results");
        assert_eq!(open.payload, "{\"path\"");
    }

    #[test]
    fn test_size_kb() {
        let event = EngineEvent {
            name: "x".to_string(),
            payload: "a".repeat(2048),
        };
        assert_eq!(event.size_kb(), 2.0);
    }
}
