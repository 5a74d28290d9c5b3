// ==========================================
// 云成本变动归因 - 下钻链接构造
// ==========================================
// 职责: 生成跳转到成本浏览 / 资源清单 / 分摊视图的链接载荷
// 约束: 透传当前生效的作用域过滤与时间控制项，参数按键名排序
// ==========================================

use crate::domain::filters::ScopeFilters;
use crate::domain::types::{CompareMode, Dimension};
use crate::domain::variance::DeepLink;
use std::collections::BTreeMap;

pub const VIEW_COST_EXPLORER: &str = "cost-explorer";
pub const VIEW_RESOURCE_INVENTORY: &str = "resource-inventory";
pub const VIEW_ALLOCATION: &str = "allocation";

#[derive(Debug, Clone)]
pub struct DeepLinkBuilder {
    base_path: String,
    base_params: BTreeMap<String, String>,
}

impl DeepLinkBuilder {
    pub fn new(
        base_path: &str,
        filters: &ScopeFilters,
        range_label: &str,
        compare: CompareMode,
    ) -> Self {
        let mut base_params: BTreeMap<String, String> = filters
            .active_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        base_params.insert("range".to_string(), range_label.to_string());
        base_params.insert("compareTo".to_string(), compare.to_string());

        Self {
            base_path: base_path.trim_end_matches('/').to_string(),
            base_params,
        }
    }

    /// 指定视图的链接
    pub fn link(&self, view: &str, label: &str, extra: &[(&str, &str)]) -> DeepLink {
        let mut params = self.base_params.clone();
        for (k, v) in extra {
            params.insert(k.to_string(), v.to_string());
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        DeepLink {
            view: view.to_string(),
            label: label.to_string(),
            href: format!("{}/{}?{}", self.base_path, view, query),
            params,
        }
    }

    /// 维度取值的默认落地视图: Team -> 分摊, Resource -> 资源清单, 其余 -> 成本浏览
    pub fn for_dimension_value(&self, dimension: Dimension, key: &str, name: &str) -> DeepLink {
        let view = match dimension {
            Dimension::Team => VIEW_ALLOCATION,
            Dimension::Resource => VIEW_RESOURCE_INVENTORY,
            _ => VIEW_COST_EXPLORER,
        };
        self.link(
            view,
            &format!("查看 {}", name),
            &[("groupBy", dimension.as_str()), (dimension.as_str(), key)],
        )
    }

    /// 下钻明细的全部跳转链接
    pub fn detail_links(&self, dimension: Dimension, key: &str, name: &str) -> Vec<DeepLink> {
        let focus = [(dimension.as_str(), key)];
        vec![
            self.link(VIEW_COST_EXPLORER, &format!("成本浏览: {}", name), &focus),
            self.link(VIEW_RESOURCE_INVENTORY, &format!("资源清单: {}", name), &focus),
            self.link(VIEW_ALLOCATION, &format!("分摊归属: {}", name), &focus),
        ]
    }
}
