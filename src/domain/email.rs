/// One new message as shown to the operator. Built per poll cycle from the
/// Gmail metadata headers and discarded after display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSummary {
    pub from: String,
    pub subject: String,
    pub date: String,
}

impl EmailSummary {
    pub fn new(
        from: impl Into<String>,
        subject: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            subject: subject.into(),
            date: date.into(),
        }
    }
}
