use crate::utils::apply_derives;
use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::{
    Expr, Ident, Item, ItemEnum, ItemStruct, LitStr, Result, Token, parse::Parse,
    parse::ParseStream, parse_macro_input,
};

/// #[integration_event] 宏实现
/// - 结构体：`topic` 必填，`event_type` 缺省为结构体名，`payload` 缺省为 `Self`
/// - 枚举：仅接受 `topic`，变体级 `#[event(event_type = "...")]` 覆写事件类型
pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    let cfg = parse_macro_input!(attr as EventAttrConfig);
    let input = parse_macro_input!(item as Item);

    let result = match input {
        Item::Struct(st) => expand_struct(cfg, st),
        Item::Enum(en) => expand_enum(cfg, en),
        other => Err(syn::Error::new(
            other.span(),
            "#[integration_event] can only be used on struct or enum types",
        )),
    };

    result.unwrap_or_else(|err| err.to_compile_error()).into()
}

fn required_derives() -> Vec<syn::Path> {
    vec![
        syn::parse_quote!(Debug),
        syn::parse_quote!(Clone),
        syn::parse_quote!(serde::Serialize),
        syn::parse_quote!(serde::Deserialize),
    ]
}

fn expand_struct(cfg: EventAttrConfig, mut st: ItemStruct) -> Result<TokenStream2> {
    let topic = cfg.require_topic(&st.ident)?;
    let event_type = cfg
        .event_type
        .unwrap_or_else(|| LitStr::new(&st.ident.to_string(), st.ident.span()));

    // payload 字段：仅支持具名字段
    let payload = match &cfg.payload {
        None => None,
        Some(name) => {
            let syn::Fields::Named(fields) = &st.fields else {
                return Err(syn::Error::new(
                    name.span(),
                    "'payload' requires a struct with named fields",
                ));
            };
            let field = fields
                .named
                .iter()
                .find(|f| f.ident.as_ref() == Some(name))
                .ok_or_else(|| {
                    syn::Error::new(name.span(), format!("no field named '{name}' on this struct"))
                })?;
            Some((name.clone(), field.ty.clone()))
        }
    };

    apply_derives(&mut st.attrs, required_derives());

    let ident = &st.ident;
    let (impl_generics, ty_generics, where_clause) = st.generics.split_for_impl();

    let (payload_ty, payload_expr) = match payload {
        Some((name, ty)) => (quote! { #ty }, quote! { &self.#name }),
        None => (quote! { Self }, quote! { self }),
    };

    Ok(quote! {
        #st

        impl #impl_generics #ident #ty_generics #where_clause {
            pub const TOPIC: &'static str = #topic;
            pub const EVENT_TYPE: &'static str = #event_type;
        }

        impl #impl_generics ::outbox_bus::event::Event for #ident #ty_generics #where_clause {
            type Payload = #payload_ty;

            fn event_type(&self) -> &str { #event_type }
            fn topic(&self) -> &str { #topic }
            fn payload(&self) -> &Self::Payload { #payload_expr }
        }
    })
}

fn expand_enum(cfg: EventAttrConfig, mut en: ItemEnum) -> Result<TokenStream2> {
    let topic = cfg.require_topic(&en.ident)?;
    if let Some(lit) = &cfg.event_type {
        return Err(syn::Error::new(
            lit.span(),
            "'event_type' is set per variant on enums; use #[event(event_type = ...)]",
        ));
    }
    if let Some(name) = &cfg.payload {
        return Err(syn::Error::new(
            name.span(),
            "'payload' is not supported on enums",
        ));
    }
    if en.variants.is_empty() {
        return Err(syn::Error::new(
            en.ident.span(),
            "#[integration_event] requires at least one variant",
        ));
    }

    apply_derives(&mut en.attrs, required_derives());

    let enum_name = en.ident.to_string();
    let mut type_arms = Vec::with_capacity(en.variants.len());

    for v in &mut en.variants {
        let mut retained = Vec::with_capacity(v.attrs.len());
        let mut type_lit: Option<LitStr> = None;

        for attr in &v.attrs {
            if !attr.path().is_ident("event") {
                retained.push(attr.clone());
                continue;
            }
            let lit = parse_variant_event_attr(attr)?;
            if type_lit.replace(lit).is_some() {
                return Err(syn::Error::new(
                    attr.span(),
                    "duplicate 'event_type' specified for this variant",
                ));
            }
        }
        v.attrs = retained;

        let v_ident = &v.ident;
        let lit = type_lit
            .unwrap_or_else(|| LitStr::new(&format!("{enum_name}.{v_ident}"), v_ident.span()));
        type_arms.push(quote! { Self::#v_ident { .. } => #lit });
    }

    let ident = &en.ident;
    let (impl_generics, ty_generics, where_clause) = en.generics.split_for_impl();

    Ok(quote! {
        #en

        impl #impl_generics #ident #ty_generics #where_clause {
            pub const TOPIC: &'static str = #topic;
        }

        impl #impl_generics ::outbox_bus::event::Event for #ident #ty_generics #where_clause {
            type Payload = Self;

            fn event_type(&self) -> &str {
                match self { #( #type_arms, )* }
            }
            fn topic(&self) -> &str { #topic }
            fn payload(&self) -> &Self::Payload { self }
        }
    })
}

// -------- parsing --------

fn parse_variant_event_attr(attr: &syn::Attribute) -> Result<LitStr> {
    let pairs = attr.parse_args_with(Punctuated::<AttrKv, Token![,]>::parse_terminated)?;

    let mut ty: Option<LitStr> = None;
    for kv in pairs {
        match kv.key.to_string().as_str() {
            "event_type" => {
                if ty.is_some() {
                    return Err(syn::Error::new(
                        kv.key.span(),
                        "duplicate key 'event_type' in attribute",
                    ));
                }
                ty = Some(kv.lit_str()?);
            }
            _ => {
                return Err(syn::Error::new(
                    kv.key.span(),
                    "unknown key; expected 'event_type'",
                ));
            }
        }
    }

    ty.ok_or_else(|| syn::Error::new(attr.span(), "expected #[event(event_type = \"...\")]"))
}

struct AttrKv {
    key: Ident,
    value: Expr,
}

impl AttrKv {
    fn lit_str(self) -> Result<LitStr> {
        match self.value {
            Expr::Lit(syn::ExprLit {
                lit: syn::Lit::Str(lit),
                ..
            }) => Ok(lit),
            other => Err(syn::Error::new(
                other.span(),
                format!("expected string literal for '{}'", self.key),
            )),
        }
    }

    fn ident(self) -> Result<Ident> {
        match self.value {
            Expr::Path(p) if p.path.segments.len() == 1 && p.qself.is_none() => {
                Ok(p.path.segments[0].ident.clone())
            }
            other => Err(syn::Error::new(
                other.span(),
                format!("expected a field name for '{}'", self.key),
            )),
        }
    }
}

impl Parse for AttrKv {
    fn parse(input: ParseStream) -> Result<Self> {
        let key: Ident = input.parse()?;
        let _eq: Token![=] = input.parse()?;
        let value: Expr = input.parse()?;
        Ok(Self { key, value })
    }
}

// 宏参数：topic = "..."、event_type = "..."、payload = field
struct EventAttrConfig {
    topic: Option<LitStr>,
    event_type: Option<LitStr>,
    payload: Option<Ident>,
}

impl EventAttrConfig {
    fn require_topic(&self, target: &Ident) -> Result<LitStr> {
        match &self.topic {
            Some(lit) if lit.value().trim().is_empty() => {
                Err(syn::Error::new(lit.span(), "'topic' must not be empty"))
            }
            Some(lit) => Ok(lit.clone()),
            None => Err(syn::Error::new(
                target.span(),
                "missing required key 'topic', e.g. #[integration_event(topic = \"orders\")]",
            )),
        }
    }
}

impl Parse for EventAttrConfig {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut cfg = Self {
            topic: None,
            event_type: None,
            payload: None,
        };

        let pairs = Punctuated::<AttrKv, Token![,]>::parse_terminated(input)?;
        for kv in pairs {
            let key = kv.key.clone();
            let duplicate = match key.to_string().as_str() {
                "topic" => cfg.topic.replace(kv.lit_str()?).is_some(),
                "event_type" => cfg.event_type.replace(kv.lit_str()?).is_some(),
                "payload" => cfg.payload.replace(kv.ident()?).is_some(),
                _ => {
                    return Err(syn::Error::new(
                        key.span(),
                        "unknown key; expected 'topic' | 'event_type' | 'payload'",
                    ));
                }
            };
            if duplicate {
                return Err(syn::Error::new(
                    key.span(),
                    format!("duplicate key '{key}' in attribute"),
                ));
            }
        }

        Ok(cfg)
    }
}
