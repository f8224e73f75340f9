use proc_macro::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, Block, Data, DeriveInput, ImplItem, ImplItemFn, ItemImpl,
    Variant, Visibility,
};

/// Turns a plain enum into a crate error type.
///
/// The attribute:
/// 1. Derives `Debug`, `thiserror::Error` and `uniffi::Error` (as a flat error)
/// 2. Appends a `Generic { message: String }` variant unless one is declared
/// 3. Implements `From<anyhow::Error>`, flattening the cause chain into `message`
///
/// # Usage
///
/// ```rust,ignore
/// #[safe4337_error]
/// pub enum OperationError {
///     #[error("unsupported entry point {address}")]
///     UnsupportedEntryPoint { address: String },
/// }
/// ```
#[proc_macro_attribute]
pub fn safe4337_error(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let Data::Enum(data_enum) = &input.data else {
        return syn::Error::new_spanned(
            &input,
            "safe4337_error can only be applied to enums",
        )
        .to_compile_error()
        .into();
    };

    let enum_name = &input.ident;
    let visibility = &input.vis;
    let generics = &input.generics;

    // derive/uniffi attributes are re-emitted below
    let attrs: Vec<_> = input
        .attrs
        .iter()
        .filter(|attr| !attr.path().is_ident("derive") && !attr.path().is_ident("uniffi"))
        .collect();

    let mut variants = data_enum.variants.clone();
    if !variants.iter().any(|variant| variant.ident == "Generic") {
        let generic_variant: Variant = syn::parse_quote! {
            /// Any other failure, carrying the flattened cause chain.
            #[error("{message}")]
            Generic {
                /// Human readable description of the failure.
                message: String
            }
        };
        variants.push(generic_variant);
    }

    quote! {
        #[derive(Debug, thiserror::Error, uniffi::Error)]
        #[uniffi(flat_error)]
        #(#attrs)*
        #visibility enum #enum_name #generics {
            #variants
        }

        impl #generics From<anyhow::Error> for #enum_name #generics {
            fn from(err: anyhow::Error) -> Self {
                let mut message = err.to_string();
                let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
                if !causes.is_empty() {
                    message.push_str(" (caused by: ");
                    message.push_str(&causes.join(" -> "));
                    message.push(')');
                }
                Self::Generic { message }
            }
        }
    }
    .into()
}

/// Scopes a logging context around every non-`const` `pub fn` of an impl block.
///
/// Each such method starts with
/// `let _safe4337_logger_ctx = crate::primitives::logger::LogContext::new("TypeName");`.
/// Public `async fn` bodies additionally run inside the task-local
/// `LOG_CONTEXT` scope so the prefix survives `.await` points.
///
/// By default the impl block is also exported with `#[uniffi::export]`
/// (adding `async_runtime = "tokio"` when async methods are present).
/// Pass `local` to only inject the logging context:
///
/// ```rust,ignore
/// #[safe4337_export(local)]
/// impl Safe4337Pack {
///     pub async fn execute_transaction(&self, op: &SafeOperation) -> Result<B256, PackError> {
///         info!("prefixed with [Safe4337][Safe4337Pack]");
///         ...
///     }
/// }
/// ```
#[proc_macro_attribute]
pub fn safe4337_export(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = proc_macro2::TokenStream::from(args);
    let input_impl = parse_macro_input!(input as ItemImpl);

    let local_only = args.to_string().trim() == "local";
    let type_name = impl_type_name(&input_impl);
    let has_async = has_public_async_fn(&input_impl.items);

    let items = input_impl
        .items
        .iter()
        .map(|item| match item {
            ImplItem::Fn(method) if needs_logging_context(method) => {
                let mut method = method.clone();
                inject_logging_context(&mut method, &type_name);
                ImplItem::Fn(method)
            }
            other => other.clone(),
        })
        .collect();

    let new_impl = ItemImpl {
        items,
        ..input_impl
    };

    if local_only {
        return quote! { #new_impl }.into();
    }

    let export_args = match (has_async, args.is_empty()) {
        (true, true) => quote! { async_runtime = "tokio" },
        (true, false) => quote! { #args, async_runtime = "tokio" },
        (false, _) => args,
    };

    quote! {
        #[uniffi::export(#export_args)]
        #new_impl
    }
    .into()
}

fn impl_type_name(input_impl: &ItemImpl) -> String {
    match &*input_impl.self_ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map_or_else(|| "Unknown".to_string(), |segment| segment.ident.to_string()),
        _ => "Unknown".to_string(),
    }
}

fn has_public_async_fn(impl_items: &[ImplItem]) -> bool {
    impl_items.iter().any(|item| {
        matches!(item, ImplItem::Fn(method)
            if matches!(method.vis, Visibility::Public(_)) && method.sig.asyncness.is_some())
    })
}

// `LogContext` is neither const-constructible nor trivially droppable.
fn needs_logging_context(method: &ImplItemFn) -> bool {
    matches!(method.vis, Visibility::Public(_)) && method.sig.constness.is_none()
}

fn inject_logging_context(method: &mut ImplItemFn, type_name: &str) {
    let stmts = &method.block.stmts;
    let body: Block = if method.sig.asyncness.is_some() {
        syn::parse_quote! {{
            crate::primitives::logger::LOG_CONTEXT
                .scope(::std::cell::RefCell::new(None), async move {
                    let _safe4337_logger_ctx =
                        crate::primitives::logger::LogContext::new(#type_name);
                    #(#stmts)*
                })
                .await
        }}
    } else {
        syn::parse_quote! {{
            let _safe4337_logger_ctx = crate::primitives::logger::LogContext::new(#type_name);
            #(#stmts)*
        }}
    };
    method.block = body;
}
