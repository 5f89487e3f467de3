use crate::optimize::driver::SearchReport;
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

//structured event streamed to whoever drives a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEvent {
    Progress {
        completed: usize,
        total: usize,
        //capped at 99 until the result is out
        percent: u8,
        best_score: Option<f64>,
    },
    Log {
        message: String,
    },
    Result {
        report: Box<SearchReport>,
    },
    Error {
        message: String,
    },
}

impl SearchEvent {
    pub fn progress(completed: usize, total: usize, best_score: Option<f64>) -> Self {
        let percent = if total == 0 {
            0
        } else {
            (completed * 100 / total).min(99) as u8
        };
        SearchEvent::Progress {
            completed,
            total,
            percent,
            best_score,
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        SearchEvent::Log {
            message: message.into(),
        }
    }
}

//receives events, framing is up to the implementation
pub trait ProgressSink {
    fn emit(&mut self, event: SearchEvent);
}

//a closed receiver is not an error for the search
impl ProgressSink for Sender<SearchEvent> {
    fn emit(&mut self, event: SearchEvent) {
        let _ = self.send(event);
    }
}

impl<F> ProgressSink for F
where
    F: FnMut(SearchEvent),
{
    fn emit(&mut self, event: SearchEvent) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn percent_is_capped_before_completion() {
        match SearchEvent::progress(37, 37, Some(1.5)) {
            SearchEvent::Progress { percent, .. } => assert_eq!(percent, 99),
            other => panic!("unexpected {:?}", other),
        }
        match SearchEvent::progress(10, 40, None) {
            SearchEvent::Progress { percent, .. } => assert_eq!(percent, 25),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn events_are_tagged_by_type() {
        let json = serde_json::to_value(SearchEvent::log("hello")).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["message"], "hello");

        let json = serde_json::to_value(SearchEvent::progress(1, 2, None)).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["percent"], 50);
    }

    #[test]
    fn channel_and_closure_sinks() {
        let (tx, rx) = channel();
        let mut sink = tx;
        sink.emit(SearchEvent::log("a"));
        assert_eq!(rx.recv().unwrap(), SearchEvent::log("a"));

        let mut seen = Vec::new();
        {
            let mut sink = |e: SearchEvent| seen.push(e);
            sink.emit(SearchEvent::log("b"));
        }
        assert_eq!(seen.len(), 1);
    }
}
