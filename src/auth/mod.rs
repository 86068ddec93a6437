// 认证模块 - Google API access token 获取与缓存

pub mod token_source;

pub use token_source::{
    AccessTokenSource, MetadataTokenSource, ServiceAccountKey, ServiceAccountTokenSource,
    StaticTokenSource, TokenCache, GOOGLE_API_SCOPES,
};
