//! Rich-output protocol between cell code and the notebook front-end.

/// Receiver for non-text cell output.
///
/// Each method takes the content and an optional display id. With `None` the
/// content is shown without an id. With `Some` pointing at an empty string,
/// the receiver reserves a fresh id and stores it back; with `Some` pointing
/// at a non-empty string, the receiver overwrites the output previously
/// rendered under that id.
pub trait DataDisplayer: Send + Sync {
    fn java_script(&self, s: &str, id: Option<&mut String>);
    fn html(&self, s: &str, id: Option<&mut String>);
    fn markdown(&self, s: &str, id: Option<&mut String>);
    fn latex(&self, s: &str, id: Option<&mut String>);
    fn svg(&self, s: &str, id: Option<&mut String>);
    fn png(&self, b: &[u8], id: Option<&mut String>);
    fn jpeg(&self, b: &[u8], id: Option<&mut String>);
    fn gif(&self, b: &[u8], id: Option<&mut String>);
    fn pdf(&self, b: &[u8], id: Option<&mut String>);
    fn text(&self, s: &str, id: Option<&mut String>);
}
