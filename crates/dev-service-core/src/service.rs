//! サービスごとのテンプレート解決と展開

use crate::error::{Result, ServiceError};
use crate::manifest::ServiceSpec;
use crate::template::{self, Substitutions, TemplateStore};
use crate::volumes::VolumeLayout;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::sync::LazyLock;

/// 名前付きボリュームとして扱える名前
/// (https://github.com/moby/moby/issues/21786)
static VOLUME_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]+$").expect("volume name pattern is valid")
});

/// テンプレートが決まったサービス
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceTemplate {
    pub name: String,
    pub image: String,
    pub template: String,
}

/// 展開済みの compose ファイル
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedService {
    pub name: String,
    pub image: String,
    pub content: String,
}

impl ServiceTemplate {
    /// マニフェストのサービスからテンプレートを決める
    ///
    /// イメージ参照はテンプレートストアから、カスタム定義は定義そのものから作ります。
    /// 対応するテンプレートがない場合は `None`。
    pub fn resolve(spec: &ServiceSpec, store: &TemplateStore) -> Result<Option<Self>> {
        let name = spec.name();
        let image = spec.image().to_string();

        let template = match spec {
            ServiceSpec::Image(_) => store.load(&name)?,
            ServiceSpec::Custom(definition) => Some(custom_template(&name, definition)?),
        };

        Ok(template.map(|template| Self {
            name,
            image,
            template,
        }))
    }

    /// 全サービスのテンプレートを決める。1つでも未対応なら全体を失敗にする
    pub fn resolve_all(specs: &[ServiceSpec], store: &TemplateStore) -> Result<Vec<Self>> {
        let mut resolved = Vec::with_capacity(specs.len());
        let mut unsupported = Vec::new();

        for spec in specs {
            match Self::resolve(spec, store)? {
                Some(template) => resolved.push(template),
                None => unsupported.push(spec.name()),
            }
        }

        if !unsupported.is_empty() {
            return Err(ServiceError::UnsupportedServices(unsupported.join(", ")));
        }

        Ok(resolved)
    }

    /// プロジェクト名とボリュームの扱いを埋め込んで展開
    pub fn render(&self, project_name: &str, layout: &VolumeLayout) -> RenderedService {
        let container_name = format!("{}_{}", project_name, self.name);
        let substitutions = Substitutions {
            image: &self.image,
            container_name: &container_name,
            projectname: project_name,
            volumes_prefix: layout.prefix.as_deref(),
        };

        let content = template::render(
            &self.template,
            &substitutions.pairs(),
            &layout.section.siblings(),
            &[layout.section.as_str()],
        );

        RenderedService {
            name: self.name.clone(),
            image: self.image.clone(),
            content,
        }
    }
}

/// カスタム定義から compose テンプレートを合成
///
/// `container_name` はプレースホルダに差し替え、`NAME:TARGET[:MODE]` 形式の
/// 名前付きボリュームはトップレベルに `{{projectname}}-NAME` の外部ボリュームとして宣言します。
fn custom_template(name: &str, definition: &Map<String, Value>) -> Result<String> {
    let mut service = definition.clone();
    service.insert(
        "container_name".to_string(),
        Value::String("{{container_name}}".to_string()),
    );

    let mut volumes = Map::new();
    if let Some(entries) = service.get("volumes").and_then(Value::as_array) {
        for entry in entries.iter().filter_map(Value::as_str) {
            let parts: Vec<&str> = entry.split(':').collect();

            // 無名ボリューム
            if parts.len() == 1 {
                continue;
            }

            // ホストパスへのマッピング
            let volume = parts[0];
            if !VOLUME_NAME.is_match(volume) {
                continue;
            }

            volumes.insert(
                volume.to_string(),
                json!({ "external": { "name": format!("{{{{projectname}}}}-{}", volume) } }),
            );
        }
    }

    let mut document = Map::new();
    document.insert("version".to_string(), json!("2.4"));
    document.insert("services".to_string(), json!({ name: service }));
    if !volumes.is_empty() {
        document.insert("volumes".to_string(), Value::Object(volumes));
    }

    serde_yaml::to_string(&document).map_err(|e| ServiceError::TemplateRender {
        service: name.to_string(),
        message: e.to_string(),
    })
}
