use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, Ident, ItemFn, Pat, PathArguments,
    Type, TypePath,
};

/// Run an async survey-backend test against a fresh database, injecting
/// whatever the test asks for, and drop that database afterwards even if the
/// test panics.
///
/// Parameters may be any of:
/// - `Client`: a tracked [`rocket::local::asynchronous::Client`]
/// - `Database`: the [`mongodb::Database`] the server is using
/// - `ScriptedAnalyzer`: the analyzer the server calls, for steering its answers
/// - `Coll<T>`: a `crate::model::mongodb::Coll<T>` on the same database
///
/// The generated test is ignored unless the calling crate's `db-tests`
/// feature is enabled, since it needs a running MongoDB replica set.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(Span::call_site(), "`backend_test` takes no arguments")
            .into_compile_error()
            .into();
    }

    let mut body = parse_macro_input!(input as ItemFn);
    let injections = match injections(&body) {
        Ok(injections) => injections,
        Err(err) => return err.into_compile_error().into(),
    };

    let test_name = body.sig.ident.clone();
    let body_name = format_ident!("__{}_body", test_name);
    body.sig.ident = body_name.clone();

    let call_args = injections.iter().map(Injection::argument);
    let collections = injections.iter().filter_map(Injection::collection_binding);

    quote! {
        #[test]
        #[cfg_attr(not(feature = "db-tests"), ignore = "requires a MongoDB replica set")]
        fn #test_name() {
            #body

            fn runtime(name: &str) -> rocket::tokio::runtime::Runtime {
                rocket::tokio::runtime::Builder::new_multi_thread()
                    .thread_name(name)
                    .worker_threads(1)
                    .enable_all()
                    .build()
                    .expect("test runtime")
            }

            // Setup and teardown run outside the test's runtime.
            let harness = runtime("test-harness");
            let (__client, __db, __analyzer) = harness.block_on(async {
                let mongo = crate::db_client().await;
                let db_name = crate::database();
                let analyzer = crate::analysis::ScriptedAnalyzer::default();
                let rocket =
                    crate::rocket_for_db_and_analyzer(mongo.clone(), &db_name, analyzer.clone())
                        .await;
                let client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .expect("valid rocket instance");
                (client, mongo.database(&db_name), analyzer)
            });

            let dropped_db = __db.clone();
            let worker = runtime("rocket-worker-test-thread");
            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
                worker.block_on(async move {
                    let (__client, __db, __analyzer) = (__client, __db, __analyzer);
                    #(#collections)*
                    #body_name(#(#call_args),*).await;
                });
            }));

            harness.block_on(async move {
                if let Err(err) = dropped_db.drop(None).await {
                    eprintln!("failed to drop test database: {err}");
                }
            });

            if let Err(cause) = outcome {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// Something the harness can hand to a test.
enum Injection {
    Client,
    Database,
    Analyzer,
    Collection { binding: Ident, model: TypePath },
}

impl Injection {
    /// The expression passed in this parameter's position.
    fn argument(&self) -> TokenStream2 {
        match self {
            Injection::Client => quote!(__client),
            Injection::Database => quote!(__db.clone()),
            Injection::Analyzer => quote!(__analyzer.clone()),
            Injection::Collection { binding, .. } => quote!(#binding),
        }
    }

    fn collection_binding(&self) -> Option<TokenStream2> {
        match self {
            Injection::Collection { binding, model } => Some(quote! {
                let #binding = crate::model::mongodb::Coll::<#model>::from_db(&__db);
            }),
            _ => None,
        }
    }

    fn classify(binding: &Ident, ty: &Type) -> Option<Self> {
        let Type::Path(path) = ty else {
            return None;
        };
        let last = path.path.segments.last()?;
        match last.ident.to_string().as_str() {
            "Client" => Some(Injection::Client),
            "Database" => Some(Injection::Database),
            "ScriptedAnalyzer" => Some(Injection::Analyzer),
            "Coll" => {
                let PathArguments::AngleBracketed(generics) = &last.arguments else {
                    return None;
                };
                match generics.args.first() {
                    Some(GenericArgument::Type(Type::Path(model))) => {
                        Some(Injection::Collection {
                            binding: binding.clone(),
                            model: model.clone(),
                        })
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Work out what to inject for each parameter of the test.
fn injections(test: &ItemFn) -> syn::Result<Vec<Injection>> {
    if test.sig.asyncness.is_none() {
        return Err(syn::Error::new(test.sig.span(), "test must be `async`"));
    }

    let mut found = Vec::new();
    let mut seen = Vec::new();
    for input in &test.sig.inputs {
        let unexpected = || {
            syn::Error::new(
                input.span(),
                "expected `Client`, `Database`, `ScriptedAnalyzer` or `Coll<T>`",
            )
        };
        let FnArg::Typed(param) = input else {
            return Err(unexpected());
        };
        let Pat::Ident(binding) = &*param.pat else {
            return Err(unexpected());
        };
        let injection = Injection::classify(&binding.ident, &param.ty).ok_or_else(unexpected)?;

        // Only collections may repeat.
        let kind = std::mem::discriminant(&injection);
        if !matches!(injection, Injection::Collection { .. }) && seen.contains(&kind) {
            return Err(syn::Error::new(input.span(), "parameter type is already injected"));
        }
        seen.push(kind);
        found.push(injection);
    }
    Ok(found)
}
