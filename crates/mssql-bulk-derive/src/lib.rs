// Proc macros operate on named structs where field.ident is always Some
#![allow(clippy::unwrap_used)]

//! # mssql-bulk-derive
//!
//! `#[derive(TvpRecord)]` for table-valued parameter rows.
//!
//! The derive describes every named field of a struct, in declaration
//! order, with the SQL type its Rust type maps to and the tags attached to
//! it. Field selection and renaming happen at encode time in `mssql-bulk`,
//! so one record type can serve several tag keys.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mssql_bulk::TvpRecord;
//!
//! #[derive(TvpRecord)]
//! struct Item {
//!     id: i32,
//!     #[tags(json = "label")]
//!     name: Option<String>,
//!     #[tags(tvp = "-")]
//!     cache: std::collections::HashMap<String, String>,
//! }
//! ```

#![warn(missing_docs)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Attribute, Data, DeriveInput, Expr, ExprLit, Fields, GenericArgument, Lit, PathArguments,
    Type, parse_macro_input,
};

/// SQL mapping decided from a field's Rust type.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mapping {
    /// Tokens constructing a `mssql_bulk::SqlType`.
    Mapped(String),
    /// No mapping; carries the type name for error messages.
    Unsupported(String),
}

/// Derive `mssql_bulk::TvpRecord` for a struct with named fields.
///
/// ## Field Attributes
///
/// - `#[tags(key = "value", ...)]` - Attach tags. `tvp` and `json` are the
///   keys read by default; `"-"` skips the field, any other value renames
///   the column. Other keys can be selected with `TvpType::with_tag_key`.
///
/// ## Type Mapping
///
/// | Rust type | SQL type |
/// |-----------|----------|
/// | `bool` | `bit` |
/// | `u8` | `tinyint` |
/// | `i8`, `i16` | `smallint` |
/// | `u16`, `i32` | `int` |
/// | `u32`, `i64`, `u64` | `bigint` |
/// | `f32` / `f64` | `real` / `float` |
/// | `String` | `nvarchar(max)` |
/// | `Vec<u8>`, `Bytes` | `varbinary(max)` |
/// | `Numeric`, `Decimal` | `decimal(38, 18)` |
/// | `Money` | `money` |
/// | `Guid`, `Uuid` | `uniqueidentifier` |
/// | `NaiveDate` | `date` |
/// | `NaiveTime` | `time(7)` |
/// | `NaiveDateTime` | `datetime2(7)` |
/// | `DateTime<FixedOffset>` | `datetimeoffset(7)` |
///
/// `Option<T>` maps like `T`. Any other type is recorded as unsupported:
/// encoding fails unless the field is skipped.
#[proc_macro_derive(TvpRecord, attributes(tags))]
pub fn derive_tvp_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match impl_tvp_record(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn impl_tvp_record(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let type_name = name.to_string();
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "TvpRecord can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                input,
                "TvpRecord can only be derived for structs",
            ));
        }
    };

    let mut descriptors = Vec::new();
    let mut value_arms = Vec::new();

    for (index, field) in fields.iter().enumerate() {
        let field_name = field.ident.as_ref().unwrap();
        let field_str = field_name.to_string();
        let tags = parse_tags(&field.attrs)?;
        let tag_pairs = tags.iter().map(|(k, v)| quote! { (#k, #v) });

        match map_type(&field.ty) {
            Mapping::Mapped(sql_type) => {
                let sql_type: TokenStream2 = sql_type.parse()?;
                descriptors.push(quote! {
                    ::mssql_bulk::tvp::FieldDescriptor::new(
                        #field_str,
                        ::mssql_bulk::tvp::FieldType::Mapped(#sql_type),
                    )
                    .with_tags(&[#(#tag_pairs),*])
                });
                value_arms.push(quote! {
                    #index => ::mssql_bulk::ToSql::to_sql(&self.#field_name)
                });
            }
            Mapping::Unsupported(host) => {
                descriptors.push(quote! {
                    ::mssql_bulk::tvp::FieldDescriptor::new(
                        #field_str,
                        ::mssql_bulk::tvp::FieldType::Unsupported(#host),
                    )
                    .with_tags(&[#(#tag_pairs),*])
                });
                value_arms.push(quote! {
                    #index => ::std::result::Result::Err(
                        ::mssql_bulk::TypeError::UnsupportedConversion {
                            from: #host,
                            to: "TVP column",
                        },
                    )
                });
            }
        }
    }

    Ok(quote! {
        impl #impl_generics ::mssql_bulk::tvp::TvpRecord for #name #ty_generics #where_clause {
            fn type_name() -> &'static str {
                #type_name
            }

            fn fields() -> &'static [::mssql_bulk::tvp::FieldDescriptor] {
                const FIELDS: &[::mssql_bulk::tvp::FieldDescriptor] = &[
                    #(#descriptors),*
                ];
                FIELDS
            }

            fn field_value(
                &self,
                index: usize,
            ) -> ::std::result::Result<::mssql_bulk::SqlValue, ::mssql_bulk::TypeError> {
                match index {
                    #(#value_arms,)*
                    _ => ::std::result::Result::Err(::mssql_bulk::TypeError::OutOfRange {
                        target_type: "TVP field index",
                    }),
                }
            }
        }
    })
}

/// Collect `#[tags(key = "value")]` pairs in order.
fn parse_tags(attrs: &[Attribute]) -> syn::Result<Vec<(String, String)>> {
    let mut tags = Vec::new();

    for attr in attrs {
        if !attr.path().is_ident("tags") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let key = meta
                .path
                .get_ident()
                .ok_or_else(|| meta.error("tag keys must be plain identifiers"))?
                .to_string();
            let value: Expr = meta.value()?.parse()?;
            match value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(lit), ..
                }) => {
                    tags.push((key, lit.value()));
                    Ok(())
                }
                other => Err(syn::Error::new_spanned(other, "tag values must be string literals")),
            }
        })?;
    }

    Ok(tags)
}

/// Map a Rust field type to its SQL type, looking through `Option`.
fn map_type(ty: &Type) -> Mapping {
    let Some((ident, args)) = last_segment(ty) else {
        return Mapping::Unsupported(type_label(ty));
    };

    let mapped = |sql: &str| Mapping::Mapped(format!("::mssql_bulk::SqlType::{sql}"));

    match ident.as_str() {
        "Option" => match args.first() {
            Some(inner) => map_type(inner),
            None => Mapping::Unsupported(ident),
        },
        "bool" => mapped("Bit"),
        "u8" => mapped("TinyInt"),
        "i8" | "i16" => mapped("SmallInt"),
        "u16" | "i32" => mapped("Int"),
        "u32" | "i64" | "u64" => mapped("BigInt"),
        "f32" => mapped("Real"),
        "f64" => mapped("Float"),
        "String" => mapped("NVarChar(::mssql_bulk::Length::Max)"),
        "Bytes" => mapped("VarBinary(::mssql_bulk::Length::Max)"),
        "Vec" if args.first().and_then(|t| last_segment(t)).is_some_and(|(inner, _)| inner == "u8") => {
            mapped("VarBinary(::mssql_bulk::Length::Max)")
        }
        "Numeric" | "Decimal" => mapped("Decimal { precision: 38, scale: 18 }"),
        "Money" => mapped("Money"),
        "Guid" | "Uuid" => mapped("UniqueIdentifier"),
        "NaiveDate" => mapped("Date"),
        "NaiveTime" => mapped("Time(7)"),
        "NaiveDateTime" => mapped("DateTime2(7)"),
        "DateTime"
            if args
                .first()
                .and_then(|t| last_segment(t))
                .is_some_and(|(offset, _)| offset == "FixedOffset") =>
        {
            mapped("DateTimeOffset(7)")
        }
        _ => Mapping::Unsupported(type_label(ty)),
    }
}

/// Last path segment of a type and its generic type arguments.
fn last_segment(ty: &Type) -> Option<(String, Vec<&Type>)> {
    let Type::Path(type_path) = ty else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    let args = match &segment.arguments {
        PathArguments::AngleBracketed(angle) => angle
            .args
            .iter()
            .filter_map(|arg| match arg {
                GenericArgument::Type(ty) => Some(ty),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Some((segment.ident.to_string(), args))
}

/// Human-readable type name with whitespace removed.
fn type_label(ty: &Type) -> String {
    quote!(#ty).to_string().replace(' ', "")
}
