//! Derive macro for oxide-query entities.
//!
//! This crate provides `#[derive(Entity)]`, which generates the declared
//! field table of a struct: its descriptor, property getters and setters,
//! and one typed field accessor per field.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Expr, ExprPath, Fields, Ident, Lit, LitStr,
    Meta, Type,
};

/// Derives `oxide_query::Entity` for a struct with named fields.
///
/// # Struct Attributes
///
/// - `#[entity(table = "name")]` - SQL table name (optional, defaults to
///   snake_case of the struct name)
/// - `#[entity(unique = "a, b")]` - Declares a unique group over the named
///   columns; may be repeated
/// - `#[entity(index = "a, b")]` - Declares a non-unique index; may be
///   repeated
/// - `#[entity(view = "path::to::definition")]` - Maps the entity to a view
///   whose body is the `SelectSpec` returned by the named function
///
/// # Field Attributes
///
/// - `#[column(name = "column_name")]` - SQL column name (optional, defaults
///   to the field name)
/// - `#[column(primary_key)]` - Marks the column as primary key
/// - `#[column(autoincrement)]` - Marks the column as database-generated
/// - `#[column(unique)]` - Marks the column as UNIQUE
/// - `#[column(length = 40)]` - Maps a string field to `VARCHAR(40)`
/// - `#[column(default = "CURRENT_TIMESTAMP")]` - Raw SQL default expression
/// - `#[column(default_value = 0)]` - Literal default, rendered by the dialect
///
/// Fields of type `Option<T>` are nullable; every other field is NOT NULL.
/// Field types must implement `SqlTyped`, `ToSqlValue`, `FromSqlValue` and
/// `Clone`.
///
/// # Generated Items
///
/// For a struct `User` with a field `name: String`, this macro generates the
/// `Entity` impl plus `User::name() -> Field<User, String>`.
#[proc_macro_derive(Entity, attributes(entity, column))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    derive_entity_impl(&input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}

fn derive_entity_impl(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let struct_name = &input.ident;
    let entity = parse_entity_attrs(&input.attrs, struct_name)?;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Entity derive only supports structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "Entity derive only supports structs",
            ));
        }
    };

    let mut columns = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.clone() else {
            return Err(syn::Error::new_spanned(field, "expected a named field"));
        };
        let attrs = parse_column_attrs(&field.attrs)?;
        if attrs.default_expr.is_some() && attrs.default_value.is_some() {
            return Err(syn::Error::new_spanned(
                field,
                "`default` and `default_value` are mutually exclusive",
            ));
        }
        columns.push(ColumnInfo {
            column_name: attrs.name.clone().unwrap_or_else(|| ident.to_string()),
            field_name: ident,
            field_type: field.ty.clone(),
            attrs,
        });
    }

    let type_name = struct_name.to_string();
    let table_name = &entity.table;
    let column_defs = columns.iter().map(column_descriptor);
    let unique_defs = entity.unique.iter().map(|group| {
        quote! { .unique([#(#group),*]) }
    });
    let index_defs = entity.index.iter().map(|group| {
        quote! { .index([#(#group),*]) }
    });
    let view_def = entity.view.as_ref().map(|path| quote! { .view(#path()) });

    let getters = columns.iter().map(|c| {
        let field_name = &c.field_name;
        let property = field_name.to_string();
        quote! {
            #property => ::oxide_query::ToSqlValue::to_sql_value(
                ::core::clone::Clone::clone(&self.#field_name)
            ),
        }
    });
    let values = columns.iter().map(|c| {
        let field_name = &c.field_name;
        let property = field_name.to_string();
        quote! {
            (#property, ::oxide_query::ToSqlValue::to_sql_value(
                ::core::clone::Clone::clone(&self.#field_name)
            )),
        }
    });
    let setters = columns.iter().map(|c| {
        let field_name = &c.field_name;
        let property = field_name.to_string();
        quote! {
            #property => self.#field_name = ::oxide_query::FromSqlValue::from_sql_value(value)?,
        }
    });
    let accessors = columns.iter().map(|c| {
        let field_name = &c.field_name;
        let field_type = &c.field_type;
        let property = field_name.to_string();
        let doc = format!("Typed reference to the `{}` column.", c.column_name);
        quote! {
            #[doc = #doc]
            #[must_use]
            pub fn #field_name() -> ::oxide_query::Field<Self, #field_type> {
                ::oxide_query::Field::new(#property)
            }
        }
    });

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics #struct_name #ty_generics #where_clause {
            #(#accessors)*
        }

        impl #impl_generics ::oxide_query::Entity for #struct_name #ty_generics #where_clause {
            fn describe() -> ::oxide_query::EntityDescriptor {
                ::oxide_query::EntityDescriptor::new(#type_name, #table_name)
                    #(.column(#column_defs))*
                    #(#unique_defs)*
                    #(#index_defs)*
                    #view_def
            }

            fn get(&self, property: &str) -> ::core::option::Option<::oxide_query::SqlValue> {
                ::core::option::Option::Some(match property {
                    #(#getters)*
                    _ => return ::core::option::Option::None,
                })
            }

            fn values(&self) -> ::std::vec::Vec<(&'static str, ::oxide_query::SqlValue)> {
                ::std::vec![#(#values)*]
            }

            fn set(
                &mut self,
                property: &str,
                value: ::oxide_query::SqlValue,
            ) -> ::core::result::Result<bool, ::oxide_query::ConversionError> {
                match property {
                    #(#setters)*
                    _ => return ::core::result::Result::Ok(false),
                }
                ::core::result::Result::Ok(true)
            }
        }
    })
}

fn column_descriptor(c: &ColumnInfo) -> TokenStream2 {
    let property = c.field_name.to_string();
    let column_name = &c.column_name;
    let field_type = &c.field_type;

    let sql_type = match c.attrs.length {
        Some(length) => quote! { ::oxide_query::SqlType::VarChar(#length) },
        None => quote! { <#field_type as ::oxide_query::SqlTyped>::SQL_TYPE },
    };
    let primary_key = c.attrs.primary_key.then(|| quote! { .primary_key() });
    let autoincrement = c.attrs.autoincrement.then(|| quote! { .autoincrement() });
    let unique = c.attrs.unique.then(|| quote! { .unique() });
    let default = if let Some(expr) = &c.attrs.default_expr {
        quote! {
            .default_value(::oxide_query::DefaultValue::Expression(
                ::std::string::String::from(#expr)
            ))
        }
    } else if let Some(value) = &c.attrs.default_value {
        quote! {
            .default_value(::oxide_query::DefaultValue::Value(
                ::oxide_query::ToSqlValue::to_sql_value(#value)
            ))
        }
    } else {
        quote! {}
    };

    quote! {
        {
            let column = ::oxide_query::ColumnDescriptor::new(#property, #column_name, #sql_type)
                #primary_key
                #autoincrement
                #unique
                #default;
            if <#field_type as ::oxide_query::SqlTyped>::NULLABLE {
                column
            } else {
                column.not_null()
            }
        }
    }
}

struct ColumnInfo {
    field_name: Ident,
    field_type: Type,
    column_name: String,
    attrs: ColumnAttrs,
}

#[derive(Default)]
struct ColumnAttrs {
    name: Option<String>,
    primary_key: bool,
    autoincrement: bool,
    unique: bool,
    length: Option<u32>,
    default_expr: Option<String>,
    default_value: Option<Lit>,
}

struct EntityAttrs {
    table: String,
    unique: Vec<Vec<String>>,
    index: Vec<Vec<String>>,
    view: Option<ExprPath>,
}

fn parse_entity_attrs(attrs: &[Attribute], struct_name: &Ident) -> syn::Result<EntityAttrs> {
    let mut result = EntityAttrs {
        table: to_snake_case(&struct_name.to_string()),
        unique: Vec::new(),
        index: Vec::new(),
        view: None,
    };

    for attr in attrs {
        if !attr.path().is_ident("entity") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                let s: LitStr = meta.value()?.parse()?;
                result.table = s.value();
            } else if meta.path.is_ident("unique") {
                let s: LitStr = meta.value()?.parse()?;
                result.unique.push(split_columns(&s)?);
            } else if meta.path.is_ident("index") {
                let s: LitStr = meta.value()?.parse()?;
                result.index.push(split_columns(&s)?);
            } else if meta.path.is_ident("view") {
                let s: LitStr = meta.value()?.parse()?;
                result.view = Some(s.parse()?);
            } else {
                return Err(meta.error("unsupported entity attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

fn parse_column_attrs(attrs: &[Attribute]) -> syn::Result<ColumnAttrs> {
    let mut result = ColumnAttrs::default();

    for attr in attrs {
        if !attr.path().is_ident("column") {
            continue;
        }
        // Handle empty attribute like #[column]
        if matches!(attr.meta, Meta::Path(_)) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("primary_key") {
                result.primary_key = true;
            } else if meta.path.is_ident("autoincrement") {
                result.autoincrement = true;
            } else if meta.path.is_ident("unique") {
                result.unique = true;
            } else if meta.path.is_ident("name") {
                let s: LitStr = meta.value()?.parse()?;
                result.name = Some(s.value());
            } else if meta.path.is_ident("length") {
                let value: Expr = meta.value()?.parse()?;
                match value {
                    Expr::Lit(syn::ExprLit {
                        lit: Lit::Int(n), ..
                    }) => result.length = Some(n.base10_parse()?),
                    other => {
                        return Err(syn::Error::new_spanned(other, "expected an integer length"));
                    }
                }
            } else if meta.path.is_ident("default") {
                let s: LitStr = meta.value()?.parse()?;
                result.default_expr = Some(s.value());
            } else if meta.path.is_ident("default_value") {
                result.default_value = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error("unsupported column attribute"));
            }
            Ok(())
        })?;
    }

    Ok(result)
}

fn split_columns(s: &LitStr) -> syn::Result<Vec<String>> {
    let columns: Vec<String> = s
        .value()
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();
    if columns.is_empty() {
        return Err(syn::Error::new_spanned(s, "expected at least one column"));
    }
    Ok(columns)
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }
    result
}
