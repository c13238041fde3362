//! Derive macros for Fairqueue action enums
//!
//! Reducers in this workspace take a single action enum that mixes three kinds
//! of variants: commands sent by callers, events the reducer records after a
//! command is accepted, and replies that carry a command's result back to the
//! waiting caller. `#[derive(Action)]` generates classification helpers for
//! those variants so runtime code and tests don't hand-maintain matches.
//!
//! # Example
//!
//! ```ignore
//! use fairqueue_macros::Action;
//!
//! #[derive(Action, Clone, Debug)]
//! enum SeatAction {
//!     #[command]
//!     Claim { buyer: String },
//!
//!     #[event]
//!     Claimed { buyer: String },
//!
//!     #[reply]
//!     Rejected { reason: String },
//! }
//!
//! assert!(SeatAction::Claim { buyer: "b".into() }.is_command());
//! assert_eq!(SeatAction::Claimed { buyer: "b".into() }.event_type(), "Claimed.v1");
//! assert_eq!(SeatAction::Rejected { reason: "x".into() }.name(), "Rejected");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident};

/// Derive macro for Action enums
///
/// Generates helper methods for action enums:
/// - `is_command()` - Returns true if this variant is a command
/// - `is_event()` - Returns true if this variant is an event
/// - `is_reply()` - Returns true if this variant answers a command
/// - `event_type()` - Returns the versioned event type name
/// - `name()` - Returns the bare variant name, for logs and metric labels
///
/// # Attributes
///
/// - `#[command]` - Mark a variant as a command
/// - `#[event]` - Mark a variant as an event
/// - `#[reply]` - Mark a variant as a command reply
///
/// Unmarked variants are allowed and classify as none of the three.
///
/// # Errors
///
/// Produces a compile error if:
/// - Applied to a non-enum type
/// - A variant carries more than one of the marker attributes
#[proc_macro_derive(Action, attributes(command, event, reply))]
pub fn derive_action(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(&input, "#[derive(Action)] can only be used on enums")
            .to_compile_error()
            .into();
    };

    let mut is_command_arms = Vec::new();
    let mut is_event_arms = Vec::new();
    let mut is_reply_arms = Vec::new();
    let mut event_type_arms = Vec::new();
    let mut name_arms = Vec::new();

    for variant in &data_enum.variants {
        let is_command = has_attribute(&variant.attrs, "command");
        let is_event = has_attribute(&variant.attrs, "event");
        let is_reply = has_attribute(&variant.attrs, "reply");

        if [is_command, is_event, is_reply].iter().filter(|m| **m).count() > 1 {
            return syn::Error::new_spanned(
                variant,
                "Variant can carry only one of #[command], #[event] or #[reply]",
            )
            .to_compile_error()
            .into();
        }

        let pattern = variant_pattern(&variant.ident, &variant.fields);
        let variant_name = variant.ident.to_string();

        if is_command {
            is_command_arms.push(quote! { #pattern => true, });
        }
        if is_event {
            let type_name = format!("{variant_name}.v1");
            is_event_arms.push(quote! { #pattern => true, });
            event_type_arms.push(quote! { #pattern => #type_name, });
        }
        if is_reply {
            is_reply_arms.push(quote! { #pattern => true, });
        }
        name_arms.push(quote! { #pattern => #variant_name, });
    }

    let expanded = quote! {
        impl #name {
            /// Returns true if this action is a command
            #[must_use]
            pub const fn is_command(&self) -> bool {
                #[allow(unreachable_patterns)]
                match self {
                    #(#is_command_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action is an event
            #[must_use]
            pub const fn is_event(&self) -> bool {
                #[allow(unreachable_patterns)]
                match self {
                    #(#is_event_arms)*
                    _ => false,
                }
            }

            /// Returns true if this action carries a command's result
            #[must_use]
            pub const fn is_reply(&self) -> bool {
                #[allow(unreachable_patterns)]
                match self {
                    #(#is_reply_arms)*
                    _ => false,
                }
            }

            /// Returns the versioned event type name
            ///
            /// Only events have type names. Everything else returns "unknown".
            #[must_use]
            pub const fn event_type(&self) -> &'static str {
                #[allow(unreachable_patterns)]
                match self {
                    #(#event_type_arms)*
                    _ => "unknown",
                }
            }

            /// Returns the variant name
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    #(#name_arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn variant_pattern(ident: &Ident, fields: &Fields) -> TokenStream2 {
    match fields {
        Fields::Named(_) => quote! { Self::#ident { .. } },
        Fields::Unnamed(_) => quote! { Self::#ident(..) },
        Fields::Unit => quote! { Self::#ident },
    }
}

fn has_attribute(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}
