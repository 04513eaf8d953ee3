use calmform::form::{FieldNode, FieldValue, FormSchema, FormStore};

#[derive(calmform::form::FormSchema)]
struct Contact {
    phone: FieldNode,
}

#[derive(calmform::form::FormSchema)]
struct DemoForm {
    #[form(rename = "emailAddress")]
    email_address: FieldNode,
    contact: Contact,
}

fn main() {
    let fields = DemoForm::fields();
    assert_eq!(fields.email_address().to_string(), "emailAddress");
    assert_eq!(fields.contact().phone().to_string(), "contact.phone");

    let store = FormStore::from_schema(DemoForm {
        email_address: FieldNode::new("a@calm.ui"),
        contact: Contact {
            phone: FieldNode::empty(),
        },
    });
    store
        .change_input(fields.contact().phone(), "+33 1 23")
        .expect("change phone");
    assert_eq!(
        store.get_field(fields.contact().phone()).expect("phone").value,
        FieldValue::from("+33 1 23")
    );
}
