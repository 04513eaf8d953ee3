use proc_macro::TokenStream;
use proc_macro2::{Ident, Span, TokenStream as TokenStream2};
use proc_macro_crate::{FoundCrate, crate_name};
use quote::{format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, LitStr, parse_macro_input};

#[proc_macro_derive(FormSchema, attributes(form))]
pub fn derive_form_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    if !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            input.ident,
            "FormSchema derive currently supports only non-generic structs",
        )
        .to_compile_error()
        .into();
    }

    let model_ident = input.ident;
    let vis = input.vis;
    let fields_struct_ident = format_ident!("{model_ident}Fields");

    let named_fields = match input.data {
        Data::Struct(data) => match data.fields {
            Fields::Named(fields) => fields.named,
            _ => {
                return syn::Error::new(
                    Span::call_site(),
                    "FormSchema derive requires a struct with named fields",
                )
                .to_compile_error()
                .into();
            }
        },
        _ => {
            return syn::Error::new(
                Span::call_site(),
                "FormSchema derive is only supported on structs",
            )
            .to_compile_error()
            .into();
        }
    };

    let calmform = calmform_path();
    let mut inserts = Vec::new();
    let mut path_methods = Vec::new();

    for field in named_fields {
        let key = match form_key(&field) {
            Ok(key) => key,
            Err(error) => return error.to_compile_error().into(),
        };
        let Some(field_ident) = field.ident else {
            continue;
        };
        let field_ty = field.ty;

        inserts.push(quote! {
            tree.insert(
                #key,
                <#field_ty as #calmform::form::FormSchemaNode>::into_form_node(self.#field_ident),
            );
        });

        path_methods.push(quote! {
            pub fn #field_ident(&self) -> <#field_ty as #calmform::form::FormSchemaNode>::Paths {
                <#field_ty as #calmform::form::FormSchemaNode>::paths(self.prefix.child(#key))
            }
        });
    }

    quote! {
        #[derive(Clone, Debug, Default)]
        #vis struct #fields_struct_ident {
            prefix: #calmform::form::FieldPath,
        }

        impl #fields_struct_ident {
            #(#path_methods)*
        }

        impl #calmform::form::FormSchema for #model_ident {
            type Fields = #fields_struct_ident;

            fn into_tree(self) -> #calmform::form::FieldTree {
                let mut tree = #calmform::form::FieldTree::new();
                #(#inserts)*
                tree
            }

            fn fields() -> Self::Fields {
                #fields_struct_ident {
                    prefix: #calmform::form::FieldPath::root(),
                }
            }
        }

        impl #calmform::form::FormSchemaNode for #model_ident {
            type Paths = #fields_struct_ident;

            fn into_form_node(self) -> #calmform::form::FormNode {
                #calmform::form::FormNode::Group(
                    <Self as #calmform::form::FormSchema>::into_tree(self),
                )
            }

            fn paths(prefix: #calmform::form::FieldPath) -> Self::Paths {
                #fields_struct_ident { prefix }
            }
        }
    }
    .into()
}

/// Key of the field in the form tree: the Rust name unless `#[form(rename = "..")]`.
fn form_key(field: &Field) -> syn::Result<String> {
    let mut key = field.ident.as_ref().map(ToString::to_string);
    for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("form")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") {
                let value: LitStr = meta.value()?.parse()?;
                key = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported form attribute, expected `rename`"))
            }
        })?;
    }
    key.ok_or_else(|| syn::Error::new_spanned(&field.ty, "FormSchema fields must be named"))
}

fn calmform_path() -> TokenStream2 {
    match crate_name("calmform") {
        Ok(FoundCrate::Name(name)) => {
            let ident = Ident::new(&name, Span::call_site());
            quote!(::#ident)
        }
        Ok(FoundCrate::Itself) => quote!(crate),
        Err(_) => quote!(::calmform),
    }
}
