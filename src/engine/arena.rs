// ==========================================
// 云成本变动归因 - 分组累加器
// ==========================================
// 职责: 稳定键 -> 稠密数组下标，累加记录按插入顺序存放
// 约束: 迭代顺序确定（插入顺序），与哈希顺序无关
// 用法: `*arena.entry(key).or_default() += value`
// ==========================================

use indexmap::IndexMap;

pub type GroupArena<K, V> = IndexMap<K, V>;
