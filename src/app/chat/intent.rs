//! Task-domain classification for inbound chat messages.

/// Which sphere of the workspace a message concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDomain {
    Work,
    Personal,
    Unknown,
}

/// Classifies a message into a task domain via keyword rules.
///
/// Personal wins over work when both match nothing distinctly work-like;
/// anything ambiguous stays `Unknown`.
#[must_use]
pub fn classify_task_domain(text: &str) -> TaskDomain {
    let lowered = text.trim().to_lowercase();
    let work = is_work_text(&lowered);
    let personal = is_personal_text(&lowered);
    match (work, personal) {
        (true, _) => TaskDomain::Work,
        (false, true) => TaskDomain::Personal,
        (false, false) => TaskDomain::Unknown,
    }
}

fn is_work_text(lowered: &str) -> bool {
    let triggers = [
        "client",
        "invoice",
        "proposal",
        "deadline",
        "sprint",
        "meeting",
        "deliverable",
        "launch",
        "report",
        "stakeholder",
        "contract",
    ];
    triggers.iter().any(|term| lowered.contains(term))
}

fn is_personal_text(lowered: &str) -> bool {
    let triggers = [
        "gym",
        "workout",
        "family",
        "groceries",
        "vacation",
        "doctor",
        "birthday",
        "errand",
        "dinner",
        "holiday",
    ];
    triggers.iter().any(|term| lowered.contains(term))
}
