//! Per-table managers: thin, stateless facades exposing the semantic
//! operations each of the six tables supports, plus the cursors they hand
//! out. Managers do not know whether the table beneath them is buffered.

mod attributes;
mod lexicon;
mod postlist;
mod positionlist;
mod record;
mod termlist;

pub use attributes::AttributeManager;
pub use lexicon::Lexicon;
pub use positionlist::{PositionListCursor, PositionListManager};
pub use postlist::{PostListManager, PostingEntry, PostingListCursor};
pub use record::RecordManager;
pub use termlist::{TermListCursor, TermListEntry, TermListManager};
