//! Derive macro describing structs as `oxide-tom` models.
//!
//! This crate provides `#[derive(Model)]`, which lists a struct's fields as
//! `FieldDef`s and generates the by-name accessors the mapper reads and
//! writes rows through.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, Fields, GenericArgument, Ident, Lit,
    Meta, PathArguments, Type,
};

/// Types the mapper stores directly; anything else is serialized.
const DIRECT_TYPES: &[&str] = &[
    "Uuid",
    "i32",
    "Decimal",
    "f64",
    "NaiveDateTime",
    "DateTime",
    "bool",
    "String",
];

/// Wrappers looked through when naming a field's element type.
const WRAPPERS: &[&str] = &["Option", "Vec", "Box", "Arc", "Rc"];

/// Derives `oxide_tom::Model` and `oxide_tom::ParameterSource` for a struct.
///
/// # Attributes
///
/// - `#[model(table = "Name")]` - Specifies the table name (optional,
///   defaults to the struct name)
///
/// # Field Attributes
///
/// - `#[field(name = "Name")]` - Specifies the column name (optional,
///   defaults to the PascalCase field name)
/// - `#[field(primary_key)]` - Makes the field part of the key
/// - `#[field(serialized)]` - Stores the field through serde even when its
///   type could be stored directly
/// - `#[field(skip)]` - Leaves the field out of the mapping
///
/// Fields of type `Uuid`, `i32`, `Decimal`, `f64`, `NaiveDateTime`,
/// `DateTime<Utc>`, `DateTime<FixedOffset>`, `bool`, `String` and
/// `Vec<u8>`, optionally wrapped in `Option`, are stored directly. Every other field must implement
/// `Serialize`, `Deserialize` and `Default`.
#[proc_macro_derive(Model, attributes(model, field))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_model_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_model_impl(input: DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let model_name = struct_name.to_string();
    let table_name = get_table_name(&input.attrs)?.unwrap_or_else(|| model_name.clone());

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input,
                    "Model derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input,
                "Model derive only supports structs",
            ));
        }
    };

    let mut field_infos: Vec<FieldInfo> = Vec::new();
    for field in fields {
        let Some(field_name) = field.ident.clone() else {
            continue;
        };
        let attrs = parse_field_attrs(&field.attrs)?;
        if attrs.skip {
            continue;
        }
        field_infos.push(FieldInfo {
            column_name: attrs
                .name
                .unwrap_or_else(|| to_pascal_case(&field_name.to_string())),
            direct: !attrs.serialized && is_direct(&field.ty),
            type_name: element_type_name(&field.ty),
            field_type: field.ty.clone(),
            primary_key: attrs.primary_key,
            field_name,
        });
    }

    let defs: Vec<TokenStream2> = field_infos
        .iter()
        .map(|info| {
            let column_name = &info.column_name;
            let type_name = &info.type_name;
            let primary_key = info.primary_key;
            let field_type = &info.field_type;
            let (semantic, nullable) = if info.direct {
                (
                    quote! { <#field_type as ::oxide_tom::FieldType>::SEMANTIC },
                    quote! { <#field_type as ::oxide_tom::FieldType>::NULLABLE },
                )
            } else {
                (quote! { ::oxide_tom::SemanticType::Object }, quote! { true })
            };
            quote! {
                ::oxide_tom::FieldDef {
                    name: #column_name,
                    semantic: #semantic,
                    nullable: #nullable,
                    type_name: #type_name,
                    primary_key: #primary_key,
                }
            }
        })
        .collect();

    let getters: Vec<TokenStream2> = field_infos
        .iter()
        .map(|info| {
            let column_name = &info.column_name;
            let field_name = &info.field_name;
            if info.direct {
                quote! {
                    #column_name => ::core::result::Result::Ok(
                        ::oxide_tom::FieldType::to_value(&self.#field_name)
                    ),
                }
            } else {
                quote! {
                    #column_name => ::oxide_tom::value::to_object(&self.#field_name),
                }
            }
        })
        .collect();

    let setters: Vec<TokenStream2> = field_infos
        .iter()
        .map(|info| {
            let column_name = &info.column_name;
            let field_name = &info.field_name;
            if info.direct {
                quote! {
                    #column_name => {
                        self.#field_name = ::oxide_tom::FieldType::from_value(value)?;
                    }
                }
            } else {
                quote! {
                    #column_name => {
                        self.#field_name = match value {
                            ::oxide_tom::Value::Null => ::core::default::Default::default(),
                            value => ::oxide_tom::value::from_object(value)?,
                        };
                    }
                }
            }
        })
        .collect();

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::oxide_tom::Model for #struct_name #ty_generics #where_clause {
            const NAME: &'static str = #model_name;
            const TABLE: &'static str = #table_name;
            const FIELDS: &'static [::oxide_tom::FieldDef] = &[#(#defs),*];

            fn get(&self, name: &str) -> ::oxide_tom::Result<::oxide_tom::Value> {
                match name {
                    #(#getters)*
                    _ => ::core::result::Result::Err(::oxide_tom::TomError::FieldNotFound(
                        ::std::format!("{}.{}", #model_name, name),
                    )),
                }
            }

            fn set(&mut self, name: &str, value: ::oxide_tom::Value) -> ::oxide_tom::Result<()> {
                match name {
                    #(#setters)*
                    _ => {
                        return ::core::result::Result::Err(::oxide_tom::TomError::FieldNotFound(
                            ::std::format!("{}.{}", #model_name, name),
                        ));
                    }
                }
                ::core::result::Result::Ok(())
            }
        }

        impl #impl_generics ::oxide_tom::ParameterSource for #struct_name #ty_generics #where_clause {
            fn parameter(
                &self,
                name: &str,
            ) -> ::oxide_tom::Result<::core::option::Option<::oxide_tom::Value>> {
                match <Self as ::oxide_tom::Model>::FIELDS
                    .iter()
                    .find(|f| f.name.eq_ignore_ascii_case(name))
                {
                    ::core::option::Option::Some(f) => {
                        ::oxide_tom::Model::get(self, f.name).map(::core::option::Option::Some)
                    }
                    ::core::option::Option::None => ::core::result::Result::Ok(
                        ::core::option::Option::None,
                    ),
                }
            }
        }
    };

    Ok(expanded)
}

struct FieldInfo {
    field_name: Ident,
    field_type: Type,
    column_name: String,
    type_name: String,
    direct: bool,
    primary_key: bool,
}

#[derive(Default)]
struct FieldAttrs {
    name: Option<String>,
    primary_key: bool,
    serialized: bool,
    skip: bool,
}

fn get_table_name(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut table_name = None;
    for attr in attrs {
        if attr.path().is_ident("model") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("table") {
                    table_name = Some(string_value(&meta)?);
                    Ok(())
                } else {
                    Err(meta.error("unsupported model attribute"))
                }
            })?;
        }
    }
    Ok(table_name)
}

fn parse_field_attrs(attrs: &[Attribute]) -> syn::Result<FieldAttrs> {
    let mut result = FieldAttrs::default();

    for attr in attrs {
        if attr.path().is_ident("field") {
            // Handle empty attribute like #[field]
            if matches!(attr.meta, Meta::Path(_)) {
                continue;
            }

            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("primary_key") {
                    result.primary_key = true;
                } else if meta.path.is_ident("serialized") {
                    result.serialized = true;
                } else if meta.path.is_ident("skip") {
                    result.skip = true;
                } else if meta.path.is_ident("name") {
                    result.name = Some(string_value(&meta)?);
                } else {
                    return Err(meta.error("unsupported field attribute"));
                }
                Ok(())
            })?;
        }
    }

    Ok(result)
}

fn string_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<String> {
    let value: Expr = meta.value()?.parse()?;
    if let Expr::Lit(lit) = &value {
        if let Lit::Str(s) = &lit.lit {
            return Ok(s.value());
        }
    }
    Err(syn::Error::new_spanned(value, "expected a string literal"))
}

/// The last path segment of a type and its first generic type argument.
fn split_type(ty: &Type) -> Option<(String, Option<&Type>)> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    let inner = match &segment.arguments {
        PathArguments::AngleBracketed(args) => args.args.iter().find_map(|arg| match arg {
            GenericArgument::Type(inner) => Some(inner),
            _ => None,
        }),
        _ => None,
    };
    Some((segment.ident.to_string(), inner))
}

fn is_direct(ty: &Type) -> bool {
    let Some((name, inner)) = split_type(ty) else {
        return false;
    };
    match (name.as_str(), inner) {
        ("Option", Some(inner)) => is_direct_scalar(inner),
        _ => is_direct_scalar(ty),
    }
}

fn is_direct_scalar(ty: &Type) -> bool {
    match split_type(ty) {
        Some((name, Some(inner))) if name == "Vec" => {
            matches!(split_type(inner), Some((element, None)) if element == "u8")
        }
        Some((name, _)) => DIRECT_TYPES.contains(&name.as_str()),
        None => false,
    }
}

/// Looks through wrapper types, e.g. `Option<Vec<Bar>>` names `Bar`.
fn element_type_name(ty: &Type) -> String {
    match split_type(ty) {
        Some((name, Some(inner))) if WRAPPERS.contains(&name.as_str()) => element_type_name(inner),
        Some((name, _)) => name,
        None => quote!(#ty).to_string().replace(' ', ""),
    }
}

fn to_pascal_case(s: &str) -> String {
    let mut result = String::new();
    let mut capitalize_next = true;
    for c in s.chars() {
        if c == '_' {
            capitalize_next = true;
        } else if capitalize_next {
            result.push(c.to_ascii_uppercase());
            capitalize_next = false;
        } else {
            result.push(c);
        }
    }
    result
}
