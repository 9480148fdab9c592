//! Derive macros for Tessera ECS components.
//!
//! This crate provides `#[derive(Component)]`, which picks a component's
//! storage strategy and, for pooled components, generates the reset step run
//! before a recycled instance is handed to its next owner.
//!
//! # Storage Strategies
//!
//! ## Plain (default)
//!
//! ```ignore
//! #[derive(Component, Default)]
//! struct Position { x: f32, y: f32 }
//! ```
//!
//! ## Pooled
//!
//! Removed instances are reset and reused:
//!
//! ```ignore
//! #[derive(Component, Default)]
//! #[component(pooled)]
//! struct Projectile {
//!     speed: f32,               // zeroed
//!     target: Option<Entity>,   // set to None
//!     trail: Vec<(f32, f32)>,   // cleared, capacity kept
//!     sprite: SpriteHandle,     // left untouched
//! }
//! ```
//!
//! Reset is shallow. Primitives become their default, `Option`s become
//! `None`, `String` and the recognized collections are cleared, and arrays
//! and tuples are reset element by element. Any other field keeps the value
//! the previous owner left in it and is listed in
//! `Component::RETAINED_ON_RESET`. Enums are reset as a whole to their
//! `Default`.
//!
//! ## Fixed
//!
//! Flat records stored inline:
//!
//! ```ignore
//! #[derive(Component, Default, Clone, Copy)]
//! #[component(fixed)]
//! struct Cell { row: u16, col: u16 }
//! ```
//!
//! # Forbidden Types (for fixed)
//!
//! Fixed components may not own heap data or shared handles:
//! `Vec`, `VecDeque`, `String`, maps and sets, `Box`, `Rc`, `Arc`, locks,
//! cells, channels, references, raw pointers and trait objects.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{quote, quote_spanned};
use syn::{
    Attribute, Data, DeriveInput, Fields, GenericArgument, Index, Member, Path, PathArguments,
    Type, spanned::Spanned,
};

/// Forbidden type patterns for fixed-layout components.
/// Each entry is (type_name, error_message).
const FORBIDDEN_TYPES: &[(&str, &str)] = &[
    (
        "Vec",
        "Vec<T> is not allowed in fixed components. Use a fixed-size array [T; N],\n\
         or drop #[component(fixed)] and use a pooled component instead",
    ),
    (
        "VecDeque",
        "VecDeque<T> is not allowed in fixed components. Use a fixed-size ring buffer,\n\
         or drop #[component(fixed)] and use a pooled component instead",
    ),
    (
        "HashMap",
        "HashMap<K, V> is not allowed in fixed components.\n\
         - Drop #[component(fixed)] to keep a map in a plain or pooled component",
    ),
    (
        "HashSet",
        "HashSet<T> is not allowed in fixed components.\n\
         - Drop #[component(fixed)] to keep a set in a plain or pooled component",
    ),
    (
        "BTreeMap",
        "BTreeMap<K, V> is not allowed in fixed components.\n\
         - Drop #[component(fixed)] to keep a map in a plain or pooled component",
    ),
    (
        "BTreeSet",
        "BTreeSet<T> is not allowed in fixed components.\n\
         - Drop #[component(fixed)] to keep a set in a plain or pooled component",
    ),
    (
        "String",
        "String is not allowed in fixed components. Alternatives:\n\
         - Use fixed-size arrays: [u8; 32] or a wrapper struct\n\
         - Use interned/hashed strings: StringId(u64)",
    ),
    (
        "Box",
        "Box<T> is not allowed in fixed components. Store T inline or reference another entity",
    ),
    (
        "Rc",
        "Rc<T> is not allowed in fixed components. Use entity references (Entity) instead",
    ),
    (
        "Arc",
        "Arc<T> is not allowed in fixed components. Use entity references (Entity) instead",
    ),
    (
        "Mutex",
        "Mutex<T> is not allowed in fixed components. The world owns synchronization",
    ),
    (
        "RwLock",
        "RwLock<T> is not allowed in fixed components. The world owns synchronization",
    ),
    (
        "RefCell",
        "RefCell<T> is not allowed in fixed components. Write through SystemContext::get_mut",
    ),
    (
        "Cell",
        "Cell<T> is not allowed in fixed components. Write through SystemContext::get_mut",
    ),
    (
        "Sender",
        "Channel Sender is not allowed in fixed components. Use a plain component instead",
    ),
    (
        "Receiver",
        "Channel Receiver is not allowed in fixed components. Use a plain component instead",
    ),
    (
        "LinkedList",
        "LinkedList<T> is not allowed in fixed components. Use a fixed-size array [T; N]",
    ),
    (
        "BinaryHeap",
        "BinaryHeap<T> is not allowed in fixed components. Use a fixed-size array [T; N]",
    ),
];

/// Scalar types reset to their default.
const PRIMITIVES: &[&str] = &[
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize", "f32",
    "f64", "bool", "char",
];

/// Containers reset with `clear()`.
const CLEARABLE: &[&str] = &[
    "String",
    "Vec",
    "VecDeque",
    "HashMap",
    "HashSet",
    "BTreeMap",
    "BTreeSet",
    "BinaryHeap",
    "LinkedList",
    "SmallVec",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Plain,
    Pooled,
    Fixed,
}

/// Parse `#[component(pooled)]` / `#[component(fixed)]`.
fn parse_strategy(attrs: &[Attribute]) -> syn::Result<Strategy> {
    let mut strategy = Strategy::Plain;

    for attr in attrs {
        if !attr.path().is_ident("component") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            let next = if meta.path.is_ident("pooled") {
                Strategy::Pooled
            } else if meta.path.is_ident("fixed") {
                Strategy::Fixed
            } else {
                return Err(meta.error("expected `pooled` or `fixed`"));
            };
            if strategy != Strategy::Plain && strategy != next {
                return Err(meta.error("a component is either pooled or fixed, not both"));
            }
            strategy = next;
            Ok(())
        })?;
    }

    Ok(strategy)
}

/// Derive macro for ECS components.
///
/// Implements `tessera_ecs::Component`. The type must also implement
/// `Default`.
///
/// # Examples
///
/// ```ignore
/// #[derive(Component, Default)]
/// struct Position { x: f32, y: f32 }
///
/// #[derive(Component, Default)]
/// #[component(pooled)]
/// struct Inventory { slots: Vec<u32>, gold: u64 }
/// ```
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);

    match expand(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let strategy = parse_strategy(&input.attrs)?;

    if let Data::Union(_) = &input.data {
        return Err(syn::Error::new(
            input.ident.span(),
            "Unions cannot derive Component. Use a struct or enum instead.",
        ));
    }

    if strategy == Strategy::Fixed {
        let mut errors = Vec::new();
        match &input.data {
            Data::Struct(data) => check_fields(&data.fields, &mut errors),
            Data::Enum(data) => {
                for variant in &data.variants {
                    check_fields(&variant.fields, &mut errors);
                }
            }
            Data::Union(_) => {}
        }
        if !errors.is_empty() {
            return Ok(errors.into_iter().collect());
        }
    }

    let body = match strategy {
        Strategy::Plain => TokenStream2::new(),
        Strategy::Fixed => quote! {
            const STRATEGY: ::tessera_ecs::StorageStrategy = ::tessera_ecs::StorageStrategy::Fixed;
        },
        Strategy::Pooled => {
            let (statements, retained) = reset_body(&input.data);
            quote! {
                const STRATEGY: ::tessera_ecs::StorageStrategy = ::tessera_ecs::StorageStrategy::Pooled;
                const RETAINED_ON_RESET: &'static [&'static str] = &[#(#retained),*];

                fn reset(&mut self) {
                    #(#statements)*
                }
            }
        }
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let mut predicates = where_clause.map(|w| w.predicates.clone()).unwrap_or_default();
    predicates.push(syn::parse_quote! {
        Self: ::core::default::Default + ::core::marker::Send + ::core::marker::Sync + 'static
    });

    Ok(quote! {
        impl #impl_generics ::tessera_ecs::Component for #name #ty_generics where #predicates {
            #body
        }
    })
}

/// Reset statements plus the names of fields left untouched.
fn reset_body(data: &Data) -> (Vec<TokenStream2>, Vec<String>) {
    let mut statements = Vec::new();
    let mut retained = Vec::new();

    match data {
        Data::Struct(data) => {
            for (index, field) in data.fields.iter().enumerate() {
                let member = field.ident.clone().map_or_else(
                    || {
                        Member::Unnamed(Index {
                            index: index as u32,
                            span: field.span(),
                        })
                    },
                    Member::Named,
                );
                let place = quote! { self.#member };

                match reset_place(&field.ty, &place) {
                    Some(statement) => statements.push(statement),
                    None => retained.push(match &field.ident {
                        Some(ident) => ident.to_string(),
                        None => index.to_string(),
                    }),
                }
            }
        }
        Data::Enum(_) => {
            statements.push(quote! { *self = ::core::default::Default::default(); });
        }
        Data::Union(_) => {}
    }

    (statements, retained)
}

/// Statement resetting the value at `place`, or `None` if the type is not
/// recognized.
fn reset_place(ty: &Type, place: &TokenStream2) -> Option<TokenStream2> {
    match ty {
        Type::Path(type_path) if type_path.qself.is_none() => {
            let segment = type_path.path.segments.last()?;
            let ident = segment.ident.to_string();

            if type_path.path.segments.len() == 1 && PRIMITIVES.contains(&ident.as_str()) {
                Some(quote! { #place = ::core::default::Default::default(); })
            } else if ident == "Option" {
                Some(quote! { #place = ::core::option::Option::None; })
            } else if CLEARABLE.contains(&ident.as_str()) {
                Some(quote! { #place.clear(); })
            } else {
                None
            }
        }
        Type::Array(array) => {
            let slot = quote! { (*__slot) };
            let inner = reset_place(&array.elem, &slot)?;
            Some(quote! {
                for __slot in #place.iter_mut() {
                    #inner
                }
            })
        }
        Type::Tuple(tuple) => {
            let mut statements = Vec::with_capacity(tuple.elems.len());
            for (index, elem) in tuple.elems.iter().enumerate() {
                let index = Index::from(index);
                statements.push(reset_place(elem, &quote! { #place.#index })?);
            }
            Some(quote! { #(#statements)* })
        }
        Type::Paren(paren) => reset_place(&paren.elem, place),
        Type::Group(group) => reset_place(&group.elem, place),
        _ => None,
    }
}

fn check_fields(fields: &Fields, errors: &mut Vec<TokenStream2>) {
    for field in fields {
        check_type(&field.ty, errors);
    }
}

fn check_type(ty: &Type, errors: &mut Vec<TokenStream2>) {
    match ty {
        Type::Path(type_path) => {
            check_type_path(&type_path.path, errors);
        }
        Type::Array(array) => {
            // Arrays are fine, but check the element type
            check_type(&array.elem, errors);
        }
        Type::Tuple(tuple) => {
            for elem in &tuple.elems {
                check_type(elem, errors);
            }
        }
        Type::Paren(paren) => {
            check_type(&paren.elem, errors);
        }
        Type::Group(group) => {
            check_type(&group.elem, errors);
        }
        Type::Reference(reference) => {
            errors.push(quote_spanned! {
                reference.and_token.span() =>
                compile_error!("References are not allowed in fixed components. Store the value inline.");
            });
        }
        Type::Ptr(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Raw pointers are not allowed in fixed components.\n\
                               Use entity references (Entity type) instead.");
            });
        }
        Type::TraitObject(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("Trait objects (dyn Trait) are not allowed in fixed components.");
            });
        }
        Type::ImplTrait(_) => {
            errors.push(quote_spanned! {
                ty.span() =>
                compile_error!("impl Trait is not allowed in component fields. Use concrete types.");
            });
        }
        _ => {}
    }
}

fn check_type_path(path: &Path, errors: &mut Vec<TokenStream2>) {
    let Some(segment) = path.segments.last() else {
        return;
    };
    let type_name = segment.ident.to_string();

    for (forbidden, message) in FORBIDDEN_TYPES {
        if type_name == *forbidden {
            let error_msg =
                format!("Fixed component field uses forbidden type `{type_name}`.\n{message}");
            let span = segment.ident.span();
            errors.push(quote_spanned! {
                span =>
                compile_error!(#error_msg);
            });
            return;
        }
    }

    // Check generic arguments recursively
    if let PathArguments::AngleBracketed(args) = &segment.arguments {
        for arg in &args.args {
            if let GenericArgument::Type(inner_ty) = arg {
                check_type(inner_ty, errors);
            }
        }
    }
}
