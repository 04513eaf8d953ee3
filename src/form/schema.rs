use super::node::{FieldNode, FieldTree, FormNode};
use super::path::FieldPath;

/// A struct describing a form's shape, usually via `#[derive(FormSchema)]`.
///
/// ```ignore
/// #[derive(FormSchema)]
/// struct Signup {
///     email: FieldNode,
///     #[form(rename = "homeAddress")]
///     home_address: Address,
/// }
///
/// let store = FormStore::from_schema(signup);
/// store.change_input(Signup::fields().home_address().city(), "Lyon")?;
/// ```
pub trait FormSchema: Sized {
    type Fields;

    fn into_tree(self) -> FieldTree;

    fn fields() -> Self::Fields;
}

/// A member of a [`FormSchema`]: either a field or a nested schema.
pub trait FormSchemaNode {
    /// Typed accessor for this member's path.
    type Paths;

    fn into_form_node(self) -> FormNode;

    fn paths(prefix: FieldPath) -> Self::Paths;
}

impl FormSchemaNode for FieldNode {
    type Paths = FieldPath;

    fn into_form_node(self) -> FormNode {
        FormNode::Field(self)
    }

    fn paths(prefix: FieldPath) -> FieldPath {
        prefix
    }
}

impl FormSchemaNode for FieldTree {
    type Paths = FieldPath;

    fn into_form_node(self) -> FormNode {
        FormNode::Group(self)
    }

    fn paths(prefix: FieldPath) -> FieldPath {
        prefix
    }
}
