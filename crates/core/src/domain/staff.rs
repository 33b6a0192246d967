use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalType;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StaffId(pub String);

impl std::fmt::Display for StaffId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub first_name: String,
    pub last_name: String,
    /// Free-form job title, e.g. `"Associate Dean"` or `"registrar"`.
    pub role: String,
    pub department: Option<String>,
    pub is_active: bool,
}

impl StaffMember {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Matches the role title against the approval tag, so `"Associate Dean"` can act as `dean`.
    pub fn holds_role(&self, approval_type: ApprovalType) -> bool {
        let role = normalize_role(&self.role);
        let tag = approval_type.as_str();
        if role.contains(tag) {
            return true;
        }

        matches!(approval_type, ApprovalType::Lecturer) && role.contains("teacher")
    }

    pub fn can_act_as(&self, approval_type: ApprovalType) -> bool {
        self.is_active && self.holds_role(approval_type)
    }

    pub fn in_department(&self, department: &str) -> bool {
        self.department
            .as_deref()
            .map(|own| own.trim().eq_ignore_ascii_case(department.trim()))
            .unwrap_or(false)
    }
}

fn normalize_role(role: &str) -> String {
    role.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::{StaffId, StaffMember};
    use crate::domain::approval::ApprovalType;

    fn staff(role: &str, is_active: bool) -> StaffMember {
        StaffMember {
            id: StaffId("S-1".to_string()),
            first_name: "Ada".to_string(),
            last_name: "Okafor".to_string(),
            role: role.to_string(),
            department: Some("Science".to_string()),
            is_active,
        }
    }

    #[test]
    fn role_title_containing_tag_is_eligible() {
        assert!(staff("Associate Dean", true).can_act_as(ApprovalType::Dean));
        assert!(staff("Accounts Receivable Officer", true)
            .can_act_as(ApprovalType::AccountsReceivable));
        assert!(staff("teacher", true).can_act_as(ApprovalType::Lecturer));
    }

    #[test]
    fn inactive_or_mismatched_staff_cannot_act() {
        assert!(!staff("dean", false).can_act_as(ApprovalType::Dean));
        assert!(!staff("registrar", true).can_act_as(ApprovalType::Dean));
    }

    #[test]
    fn department_match_ignores_case() {
        assert!(staff("dean", true).in_department("science"));
        assert!(!staff("dean", true).in_department("Law"));
    }
}
