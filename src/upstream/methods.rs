//! Upstream API calls exposed as registry methods.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::dispatch::{HandlerError, HandlerResult, MethodHandler, MethodRegistry, RequestContext};
use crate::observability::metrics;
use crate::upstream::client::UpstreamClient;

const DEFAULT_CODE_WIDTH: u32 = 430;
const DEFAULT_LANG: &str = "zh_CN";

/// Every upstream operation served through `/call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Api {
    GetNewAccessToken,
    GetWebOauthAccessToken,
    RefreshWebOauthAccessToken,
    GetWebOauthUserinfo,
    CheckWebOauthAccessTokenValid,
    WxappOauth,
    GetWxappCode,
    GetWxappCodeUnlimit,
    GetWxappCodeQrcode,
    SendTemplateMessage,
    SendWxappTemplateMessage,
}

impl Api {
    pub const ALL: [Api; 11] = [
        Api::GetNewAccessToken,
        Api::GetWebOauthAccessToken,
        Api::RefreshWebOauthAccessToken,
        Api::GetWebOauthUserinfo,
        Api::CheckWebOauthAccessTokenValid,
        Api::WxappOauth,
        Api::GetWxappCode,
        Api::GetWxappCodeUnlimit,
        Api::GetWxappCodeQrcode,
        Api::SendTemplateMessage,
        Api::SendWxappTemplateMessage,
    ];

    /// Method name used in the `method` field.
    pub fn name(self) -> &'static str {
        match self {
            Api::GetNewAccessToken => "GetNewAccessToken",
            Api::GetWebOauthAccessToken => "GetWebOauthAccessToken",
            Api::RefreshWebOauthAccessToken => "RefreshWebOauthAccessToken",
            Api::GetWebOauthUserinfo => "GetWebOauthUserinfo",
            Api::CheckWebOauthAccessTokenValid => "CheckWebOauthAccessTokenValid",
            Api::WxappOauth => "WxappOauth",
            Api::GetWxappCode => "GetWxappCode",
            Api::GetWxappCodeUnlimit => "GetWxappCodeUnlimit",
            Api::GetWxappCodeQrcode => "GetWxappCodeQrcode",
            Api::SendTemplateMessage => "SendTemplateMessage",
            Api::SendWxappTemplateMessage => "SendWxappTemplateMessage",
        }
    }
}

/// Registry entry binding an [`Api`] to the shared client.
pub struct ApiMethod {
    api: Api,
    client: Arc<UpstreamClient>,
}

impl ApiMethod {
    pub fn new(api: Api, client: Arc<UpstreamClient>) -> Self {
        Self { api, client }
    }

    async fn invoke(&self, ctx: &RequestContext) -> HandlerResult {
        let client = &self.client;
        let account = ctx.account();

        let body = match self.api {
            Api::GetNewAccessToken => client.fetch_access_token(account).await?,
            Api::GetWebOauthAccessToken => {
                let code = required(ctx, "code")?;
                client
                    .get(
                        "/sns/oauth2/access_token",
                        &[
                            ("appid", account.app_id.as_str()),
                            ("secret", account.app_secret.as_str()),
                            ("code", code),
                            ("grant_type", "authorization_code"),
                        ],
                    )
                    .await?
            }
            Api::RefreshWebOauthAccessToken => {
                let refresh_token = required(ctx, "refreshToken")?;
                client
                    .get(
                        "/sns/oauth2/refresh_token",
                        &[
                            ("appid", account.app_id.as_str()),
                            ("grant_type", "refresh_token"),
                            ("refresh_token", refresh_token),
                        ],
                    )
                    .await?
            }
            Api::GetWebOauthUserinfo => {
                let open_id = required(ctx, "openId")?;
                let access_token = required(ctx, "accessToken")?;
                let lang = optional(ctx, "lang").unwrap_or(DEFAULT_LANG);
                client
                    .get(
                        "/sns/userinfo",
                        &[
                            ("access_token", access_token),
                            ("openid", open_id),
                            ("lang", lang),
                        ],
                    )
                    .await?
            }
            Api::CheckWebOauthAccessTokenValid => {
                let open_id = required(ctx, "openId")?;
                let access_token = required(ctx, "accessToken")?;
                client
                    .get(
                        "/sns/auth",
                        &[("access_token", access_token), ("openid", open_id)],
                    )
                    .await?
            }
            Api::WxappOauth => {
                let js_code = required(ctx, "jsCode")?;
                client
                    .get(
                        "/sns/jscode2session",
                        &[
                            ("appid", account.app_id.as_str()),
                            ("secret", account.app_secret.as_str()),
                            ("js_code", js_code),
                            ("grant_type", "authorization_code"),
                        ],
                    )
                    .await?
            }
            Api::GetWxappCode => {
                let body = json!({
                    "path": required(ctx, "path")?,
                    "width": width(ctx)?,
                });
                self.post_with_token(ctx, "/wxa/getwxacode", &body).await?
            }
            Api::GetWxappCodeUnlimit => {
                let mut body = json!({
                    "scene": required(ctx, "scene")?,
                    "width": width(ctx)?,
                });
                if let Some(page) = optional(ctx, "page") {
                    body["page"] = Value::from(page);
                }
                self.post_with_token(ctx, "/wxa/getwxacodeunlimit", &body).await?
            }
            Api::GetWxappCodeQrcode => {
                let body = json!({
                    "path": required(ctx, "path")?,
                    "width": width(ctx)?,
                });
                self.post_with_token(ctx, "/cgi-bin/wxaapp/createwxaqrcode", &body)
                    .await?
            }
            Api::SendTemplateMessage => {
                let body = json_param(ctx, "data")?;
                self.post_with_token(ctx, "/cgi-bin/message/template/send", &body)
                    .await?
            }
            Api::SendWxappTemplateMessage => {
                let body = json_param(ctx, "data")?;
                self.post_with_token(ctx, "/cgi-bin/message/wxopen/template/send", &body)
                    .await?
            }
        };

        Ok(body)
    }

    async fn post_with_token(
        &self,
        ctx: &RequestContext,
        path: &str,
        body: &Value,
    ) -> HandlerResult {
        let token = self.client.access_token(ctx.account()).await?;
        Ok(self
            .client
            .post_json(path, &[("access_token", token.as_str())], body)
            .await?)
    }
}

#[async_trait]
impl MethodHandler for ApiMethod {
    async fn call(&self, ctx: &RequestContext) -> HandlerResult {
        let result = self.invoke(ctx).await;
        metrics::record_upstream_call(
            self.api.name(),
            if result.is_ok() { "ok" } else { "error" },
        );
        result
    }
}

/// Register every [`Api`] against `client`.
pub fn register_all(registry: MethodRegistry, client: Arc<UpstreamClient>) -> MethodRegistry {
    Api::ALL.iter().fold(registry, |registry, api| {
        registry.register(api.name(), ApiMethod::new(*api, Arc::clone(&client)))
    })
}

fn optional<'a>(ctx: &'a RequestContext, name: &str) -> Option<&'a str> {
    ctx.param(name).filter(|v| !v.is_empty())
}

fn required<'a>(ctx: &'a RequestContext, name: &'static str) -> Result<&'a str, HandlerError> {
    optional(ctx, name).ok_or(HandlerError::MissingParam(name))
}

fn width(ctx: &RequestContext) -> Result<u32, HandlerError> {
    match optional(ctx, "width") {
        None => Ok(DEFAULT_CODE_WIDTH),
        Some(raw) => raw.parse().map_err(|e: std::num::ParseIntError| {
            HandlerError::InvalidParam {
                name: "width",
                reason: e.to_string(),
            }
        }),
    }
}

fn json_param(ctx: &RequestContext, name: &'static str) -> Result<Value, HandlerError> {
    serde_json::from_str(required(ctx, name)?).map_err(|e| HandlerError::InvalidParam {
        name,
        reason: e.to_string(),
    })
}
