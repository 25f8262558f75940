/// What a line typed by the user turns into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Send(String),
    Quit,
    Noop,
}
