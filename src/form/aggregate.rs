//! Read-only walks over a [`FieldTree`] computing validity and completion.

use serde::Serialize;

use super::node::{FieldNode, FieldTree, FormNode};
use super::path::FieldPath;

/// Percentage reported for a form that has no eligible fields.
pub const EMPTY_FORM_PERCENT: u8 = 100;

/// A visible field whose rule rejected its current value.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct InvalidField {
    pub path: FieldPath,
    pub message: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ValidityReport {
    pub invalid: Vec<InvalidField>,
}

impl ValidityReport {
    pub fn is_valid(&self) -> bool {
        self.invalid.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct Completion {
    pub count: usize,
    pub filled: usize,
}

impl Completion {
    /// `round(100 * filled / count)` with halves rounded up.
    pub fn percent(&self) -> u8 {
        if self.count == 0 {
            return EMPTY_FORM_PERCENT;
        }
        let rounded = (self.filled * 200 + self.count) / (self.count * 2);
        u8::try_from(rounded).unwrap_or(100)
    }
}

pub fn check_validity(tree: &FieldTree) -> ValidityReport {
    let mut report = ValidityReport::default();
    collect_invalid(tree, &FieldPath::root(), &mut report.invalid);
    report
}

fn collect_invalid(tree: &FieldTree, path: &FieldPath, invalid: &mut Vec<InvalidField>) {
    for (key, node) in tree.iter() {
        if node.is_hidden() {
            continue;
        }
        let child_path = path.child(key);
        match node {
            FormNode::Field(field) => {
                let Some(rule) = &field.validation else {
                    continue;
                };
                if let Err(violation) = rule.validate_sync(&field.value) {
                    tracing::trace!(path = %child_path, %violation, "field fails validation");
                    invalid.push(InvalidField {
                        path: child_path,
                        message: violation.message().to_string(),
                    });
                }
            }
            FormNode::Group(group) => collect_invalid(group, &child_path, invalid),
        }
    }
}

pub fn compute_completion(tree: &FieldTree) -> Completion {
    let mut completion = Completion::default();
    count_completion(tree, &mut completion);
    completion
}

fn count_completion(tree: &FieldTree, completion: &mut Completion) {
    for (_, node) in tree.iter() {
        if node.is_hidden() {
            continue;
        }
        match node {
            FormNode::Field(field) if field.exclude_from_fill_percent => {}
            FormNode::Field(field) => {
                completion.count += 1;
                if is_filled(field) {
                    completion.filled += 1;
                }
            }
            FormNode::Group(group) => count_completion(group, completion),
        }
    }
}

fn is_filled(field: &FieldNode) -> bool {
    match &field.validation {
        Some(rule) => rule.validate_sync(&field.value).is_ok(),
        None => !field.value.is_blank() && field.error.is_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::validation::{RuleViolation, rule_fn};
    use crate::form::value::FieldValue;

    fn required() -> crate::form::validation::SharedRule {
        rule_fn(|value: &FieldValue| {
            if value.is_blank() {
                Err(RuleViolation::new("required"))
            } else {
                Ok(())
            }
        })
    }

    #[test]
    fn hidden_groups_hide_their_whole_subtree() {
        let tree = FieldTree::new()
            .with("name", FieldNode::new("Ada").validation(required()))
            .with(
                "company",
                FieldTree::new()
                    .hidden(true)
                    .with("vat", FieldNode::empty().validation(required())),
            );

        let report = check_validity(&tree);
        assert!(report.is_valid());
        assert_eq!(compute_completion(&tree), Completion { count: 1, filled: 1 });
    }

    #[test]
    fn invalid_fields_are_reported_with_paths() {
        let tree = FieldTree::new().with(
            "contact",
            FieldTree::new()
                .with("email", FieldNode::empty().validation(required()))
                .with("phone", FieldNode::empty()),
        );

        let report = check_validity(&tree);
        assert_eq!(
            report.invalid,
            vec![InvalidField {
                path: FieldPath::parse("contact.email").expect("path"),
                message: "required".to_string(),
            }]
        );
    }

    #[test]
    fn three_of_four_is_seventy_five_percent() {
        let tree = FieldTree::new()
            .with("a", FieldNode::new("x"))
            .with("b", FieldNode::new(true))
            .with("c", FieldNode::new("y").validation(required()))
            .with("d", FieldNode::new("   "))
            .with("e", FieldNode::empty().exclude_from_fill_percent(true));

        let completion = compute_completion(&tree);
        assert_eq!(completion, Completion { count: 4, filled: 3 });
        assert_eq!(completion.percent(), 75);
    }

    #[test]
    fn fields_with_errors_are_not_filled() {
        let tree = FieldTree::new()
            .with("a", FieldNode::new("x").error("taken"))
            .with("b", FieldNode::new("y"));
        assert_eq!(compute_completion(&tree).percent(), 50);
    }

    #[test]
    fn empty_form_is_complete() {
        assert_eq!(compute_completion(&FieldTree::new()).percent(), EMPTY_FORM_PERCENT);
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(Completion { count: 3, filled: 2 }.percent(), 67);
        assert_eq!(Completion { count: 8, filled: 1 }.percent(), 13);
        assert_eq!(Completion { count: 3, filled: 1 }.percent(), 33);
    }
}
