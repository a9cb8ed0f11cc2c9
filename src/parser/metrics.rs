//! 财务指标提取管道
//!
//! 每个主指标对应一条有序的提取策略链：先尝试表格格式（千元单位），
//! 再尝试叙述格式（亿元单位）的多种同义标签，最后才是不带单位的裸数字。
//! 第一个成功的策略生效，其余策略不再执行。比率类指标只由其他指标计算得出。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::anchor::{locate_window, Anchor, ScanWindow};
use super::numeric::{self, NUMBER_PATTERN};

/// 千元表格数值换算到亿元口径的系数
pub const TABLE_UNIT_FACTOR: f64 = 0.0001;
/// 裸数字超过该阈值时认为其单位是较小的单位
pub const BARE_VALUE_THRESHOLD: f64 = 10_000.0;
/// 裸数字超过阈值后的换算系数
pub const BARE_VALUE_RESCALE: f64 = 0.0001;
/// 表格格式锚点之后扫描的字符数
pub const TABLE_WINDOW: ScanWindow = ScanWindow::new(0, 200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Revenue,
    NetProfit,
    TotalAssets,
    TotalLiabilities,
    OperatingCashFlow,
    NetAssets,
    Roe,
    GrossMargin,
    DebtRatio,
    ProfitMargin,
}

impl MetricKey {
    pub const ALL: [MetricKey; 10] = [
        MetricKey::Revenue,
        MetricKey::NetProfit,
        MetricKey::TotalAssets,
        MetricKey::TotalLiabilities,
        MetricKey::OperatingCashFlow,
        MetricKey::NetAssets,
        MetricKey::Roe,
        MetricKey::GrossMargin,
        MetricKey::DebtRatio,
        MetricKey::ProfitMargin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::Revenue => "revenue",
            MetricKey::NetProfit => "net_profit",
            MetricKey::TotalAssets => "total_assets",
            MetricKey::TotalLiabilities => "total_liabilities",
            MetricKey::OperatingCashFlow => "operating_cash_flow",
            MetricKey::NetAssets => "net_assets",
            MetricKey::Roe => "roe",
            MetricKey::GrossMargin => "gross_margin",
            MetricKey::DebtRatio => "debt_ratio",
            MetricKey::ProfitMargin => "profit_margin",
        }
    }

    pub fn label_zh(&self) -> &'static str {
        match self {
            MetricKey::Revenue => "营业收入",
            MetricKey::NetProfit => "净利润",
            MetricKey::TotalAssets => "总资产",
            MetricKey::TotalLiabilities => "总负债",
            MetricKey::OperatingCashFlow => "经营现金流",
            MetricKey::NetAssets => "净资产",
            MetricKey::Roe => "净资产收益率",
            MetricKey::GrossMargin => "毛利率",
            MetricKey::DebtRatio => "资产负债率",
            MetricKey::ProfitMargin => "净利率",
        }
    }

    /// 只能由其他指标计算，不从文本中直接提取
    pub fn is_derived(&self) -> bool {
        matches!(self, MetricKey::Roe | MetricKey::DebtRatio | MetricKey::ProfitMargin)
    }

    pub fn is_ratio(&self) -> bool {
        self.is_derived() || *self == MetricKey::GrossMargin
    }
}

/// 十个固定指标，缺失值为 None，序列化时输出 null 而不是省略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    pub revenue: Option<f64>,
    pub net_profit: Option<f64>,
    pub total_assets: Option<f64>,
    pub total_liabilities: Option<f64>,
    pub operating_cash_flow: Option<f64>,
    pub net_assets: Option<f64>,
    pub roe: Option<f64>,
    pub gross_margin: Option<f64>,
    pub debt_ratio: Option<f64>,
    pub profit_margin: Option<f64>,
}

impl MetricSet {
    pub fn get(&self, key: MetricKey) -> Option<f64> {
        match key {
            MetricKey::Revenue => self.revenue,
            MetricKey::NetProfit => self.net_profit,
            MetricKey::TotalAssets => self.total_assets,
            MetricKey::TotalLiabilities => self.total_liabilities,
            MetricKey::OperatingCashFlow => self.operating_cash_flow,
            MetricKey::NetAssets => self.net_assets,
            MetricKey::Roe => self.roe,
            MetricKey::GrossMargin => self.gross_margin,
            MetricKey::DebtRatio => self.debt_ratio,
            MetricKey::ProfitMargin => self.profit_margin,
        }
    }

    fn slot_mut(&mut self, key: MetricKey) -> &mut Option<f64> {
        match key {
            MetricKey::Revenue => &mut self.revenue,
            MetricKey::NetProfit => &mut self.net_profit,
            MetricKey::TotalAssets => &mut self.total_assets,
            MetricKey::TotalLiabilities => &mut self.total_liabilities,
            MetricKey::OperatingCashFlow => &mut self.operating_cash_flow,
            MetricKey::NetAssets => &mut self.net_assets,
            MetricKey::Roe => &mut self.roe,
            MetricKey::GrossMargin => &mut self.gross_margin,
            MetricKey::DebtRatio => &mut self.debt_ratio,
            MetricKey::ProfitMargin => &mut self.profit_margin,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, Option<f64>)> + '_ {
        MetricKey::ALL.iter().map(move |key| (*key, self.get(*key)))
    }

    pub fn found_count(&self) -> usize {
        self.iter().filter(|(_, value)| value.is_some()).count()
    }

    /// 按优先级补全派生值：先推算总负债，再计算三个比率
    fn derive(&mut self) {
        if self.total_liabilities.is_none() {
            if let (Some(assets), Some(equity)) = (self.total_assets, self.net_assets) {
                self.total_liabilities = Some(round2(assets - equity));
                debug!("总负债由 总资产 - 净资产 推算");
            }
        }

        self.debt_ratio = percent_of(self.total_liabilities, self.total_assets);
        self.roe = percent_of(self.net_profit, self.net_assets);
        self.profit_margin = percent_of(self.net_profit, self.revenue);
    }
}

/// 数值是否带有明确的单位上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitContext {
    Explicit,
    Bare,
}

#[derive(Debug, Clone)]
pub enum Locate {
    /// 定位锚点，再在其后的有限窗口中找第一个数字
    Window { anchor: Anchor, window: ScanWindow },
    /// 模式的第一个捕获组就是数字
    Capture(Regex),
}

#[derive(Debug, Clone)]
pub struct ExtractionStrategy {
    pub label: &'static str,
    pub locate: Locate,
    pub factor: f64,
    pub unit: UnitContext,
}

impl ExtractionStrategy {
    /// 表格格式：标签后跟千元单位，数字在锚点之后的窗口内
    pub fn table(label: &'static str, anchor_pattern: &str) -> Self {
        Self {
            label,
            locate: Locate::Window {
                anchor: Anchor::Pattern(compile(anchor_pattern)),
                window: TABLE_WINDOW,
            },
            factor: TABLE_UNIT_FACTOR,
            unit: UnitContext::Explicit,
        }
    }

    /// 捕获格式，模式中的 `{N}` 会被替换为数字语法
    pub fn capture(label: &'static str, pattern: &str, factor: f64, unit: UnitContext) -> Self {
        let pattern = pattern.replace("{N}", &format!("({NUMBER_PATTERN})"));
        Self {
            label,
            locate: Locate::Capture(compile(&pattern)),
            factor,
            unit,
        }
    }

    /// 数字紧邻亿元单位的叙述格式
    pub fn narrative(label: &'static str, pattern: &str) -> Self {
        Self::capture(label, pattern, 1.0, UnitContext::Explicit)
    }

    /// 不带单位的裸数字
    pub fn bare(label: &'static str, pattern: &str) -> Self {
        Self::capture(label, pattern, 1.0, UnitContext::Bare)
    }

    pub fn apply(&self, text: &str) -> Option<f64> {
        let raw = match &self.locate {
            Locate::Window { anchor, window } => locate_window(text, anchor, *window).and_then(numeric::scan),
            Locate::Capture(re) => {
                let group = re.captures(text)?.get(1)?;
                numeric::parse_at(text, group.start(), group.end())
            }
        }?;

        let value = raw * self.factor;
        Some(match self.unit {
            UnitContext::Explicit => value,
            UnitContext::Bare => correct_bare_value(value),
        })
    }
}

/// 一个主指标及其有序策略链
#[derive(Debug, Clone)]
pub struct MetricRule {
    pub key: MetricKey,
    pub strategies: Vec<ExtractionStrategy>,
}

impl MetricRule {
    pub fn new(key: MetricKey, strategies: Vec<ExtractionStrategy>) -> Self {
        debug_assert!(!key.is_derived(), "{} is derived", key.as_str());
        Self { key, strategies }
    }

    /// 第一个成功的策略生效
    pub fn resolve(&self, text: &str) -> Option<(&'static str, f64)> {
        first_success(&self.strategies, |strategy| {
            strategy.apply(text).map(|value| (strategy.label, value))
        })
    }
}

pub fn first_success<S, T>(candidates: &[S], attempt: impl FnMut(&S) -> Option<T>) -> Option<T> {
    candidates.iter().find_map(attempt)
}

pub struct MetricExtractor {
    rules: Vec<MetricRule>,
}

impl MetricExtractor {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<MetricRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[MetricRule] {
        &self.rules
    }

    /// 从年报文本中提取全部指标，任何输入都不会报错
    pub fn extract(&self, text: &str) -> MetricSet {
        let mut metrics = MetricSet::default();

        for rule in &self.rules {
            match rule.resolve(text) {
                Some((label, value)) => {
                    debug!("{} = {} (策略: {})", rule.key.as_str(), value, label);
                    *metrics.slot_mut(rule.key) = Some(value);
                }
                None => debug!("{} 未找到", rule.key.as_str()),
            }
        }

        metrics.derive();
        metrics
    }
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new()
    }
}

static DEFAULT_EXTRACTOR: Lazy<MetricExtractor> = Lazy::new(MetricExtractor::new);

/// 使用默认策略表提取指标
pub fn extract_metrics(text: &str) -> MetricSet {
    DEFAULT_EXTRACTOR.extract(text)
}

/// 默认策略表，顺序即优先级
pub fn default_rules() -> Vec<MetricRule> {
    use ExtractionStrategy as S;

    vec![
        MetricRule::new(MetricKey::Revenue, vec![
            S::table("营业收入(千元表格)", r"营业收入.*千元"),
            S::narrative("营业总收入(亿元)", r"营业总收入\s*[：:]\s*{N}\s*亿"),
            S::narrative("营业收入(亿元)", r"营业收入\s*[：:]\s*{N}\s*亿"),
            S::bare("营业收入(裸数字)", r"营业收入\s*{N}"),
        ]),
        MetricRule::new(MetricKey::NetProfit, vec![
            S::table("归母净利润(千元表格)", r"归属于上市公司股东的净利润.*千元"),
            S::narrative("净利润(亿元)", r"净利润\s*[：:]\s*{N}\s*亿"),
            S::narrative("归母净利润(亿元)", r"归母净利润\s*[：:]\s*{N}\s*亿"),
            S::bare("净利润(裸数字)", r"净利润\s*{N}"),
        ]),
        MetricRule::new(MetricKey::OperatingCashFlow, vec![
            S::table("经营现金流净额(千元表格)", r"经营活动产生的现金流量净额.*千元"),
            S::narrative("经营现金流净额(亿元)", r"经营活动产生的现金流量净额\s*[：:]\s*{N}\s*亿"),
            S::bare("经营现金流(裸数字)", r"经营活动现金流.*?{N}"),
        ]),
        MetricRule::new(MetricKey::TotalAssets, vec![
            S::capture("资产总额(千元下一行)", r"资产总额.*?千元.*?\n\s*{N}", TABLE_UNIT_FACTOR, UnitContext::Explicit),
            S::narrative("总资产(亿元)", r"(?:总资产|资产总额|资产总计)\s*[：:]\s*{N}\s*亿"),
        ]),
        MetricRule::new(MetricKey::TotalLiabilities, vec![
            S::capture("负债合计(千元下一行)", r"负债合计.*?千元.*?\n\s*{N}", TABLE_UNIT_FACTOR, UnitContext::Explicit),
            S::narrative("总负债(亿元)", r"(?:总负债|负债合计|负债总额)\s*[：:]\s*{N}\s*亿"),
        ]),
        MetricRule::new(MetricKey::NetAssets, vec![
            S::capture("归母净资产(下一行)", r"归属于上市公司股东的净资产.*?\n\s*{N}", TABLE_UNIT_FACTOR, UnitContext::Explicit),
            S::narrative("净资产(亿元)", r"(?:归属于上市公司股东的净资产|股东权益合计|净资产)\s*[：:]\s*{N}\s*亿"),
        ]),
        MetricRule::new(MetricKey::GrossMargin, vec![
            S::capture("毛利率(表格深处)", r"(?s)毛利率.{50,500}?{N}\s*[%％]", 1.0, UnitContext::Explicit),
            S::capture("毛利率(同行)", r"毛利率\s*(?:为)?\s*[：:]?\s*{N}\s*[%％]", 1.0, UnitContext::Explicit),
        ]),
    ]
}

/// 裸数字的单位纠正：超过阈值时按较小单位处理
pub fn correct_bare_value(value: f64) -> f64 {
    if value > BARE_VALUE_THRESHOLD {
        value * BARE_VALUE_RESCALE
    } else {
        value
    }
}

/// 保留两位小数（远离零方向舍入）
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn percent_of(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(round2(n / d * 100.0)),
        _ => None,
    }
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid metric pattern '{}': {}", pattern, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(actual: Option<f64>, expected: f64) {
        let value = actual.unwrap_or_else(|| panic!("expected {}, got None", expected));
        assert!((value - expected).abs() < 1e-6, "expected {}, got {}", expected, value);
    }

    #[test]
    fn test_table_revenue_on_next_line() {
        let metrics = extract_metrics("营业收入（千元）\n1,234,567");
        approx(metrics.revenue, 123.4567);
    }

    #[test]
    fn test_table_revenue_same_line_half_width_brackets() {
        let metrics = extract_metrics("营业收入(千元) 98,000 同比增长 12%");
        approx(metrics.revenue, 9.8);
    }

    #[test]
    fn test_table_window_is_bounded() {
        let filler = "说明".repeat(120);
        let text = format!("营业收入（千元）{}\n1,000,000", filler);
        assert_eq!(extract_metrics(&text).revenue, None);
    }

    #[test]
    fn test_table_strategy_wins_over_narrative() {
        let text = "营业收入：88.5亿元\n营业收入（千元）\n5,000,000";
        approx(extract_metrics(text).revenue, 500.0);
    }

    #[test]
    fn test_narrative_synonyms_in_order() {
        approx(extract_metrics("营业总收入：320.5 亿元").revenue, 320.5);
        approx(extract_metrics("营业收入: 45亿").revenue, 45.0);
        approx(extract_metrics("归母净利润：12.3亿元").net_profit, 12.3);
    }

    #[test]
    fn test_explicit_unit_is_never_rescaled() {
        approx(extract_metrics("营业总收入：12,345亿元").revenue, 12345.0);
    }

    #[test]
    fn test_bare_number_rescaled_above_threshold() {
        approx(extract_metrics("营业收入 123456").revenue, 12.3456);
        approx(extract_metrics("营业收入 8,000").revenue, 8000.0);
    }

    #[test]
    fn test_malformed_number_falls_through() {
        assert_eq!(extract_metrics("营业收入 1,2345").revenue, None);
    }

    #[test]
    fn test_operating_cash_flow_chain() {
        approx(extract_metrics("经营活动产生的现金流量净额（千元）\n 250,000").operating_cash_flow, 25.0);
        approx(extract_metrics("经营活动产生的现金流量净额：7.5亿元").operating_cash_flow, 7.5);
        approx(extract_metrics("经营活动现金流量净额为 6.2").operating_cash_flow, 6.2);
    }

    #[test]
    fn test_balance_sheet_values_on_following_line() {
        let text = "资产总额（千元）\n  2,000,000\n负债合计（千元）\n 1,200,000\n归属于上市公司股东的净资产（千元）\n700,000";
        let metrics = extract_metrics(text);
        approx(metrics.total_assets, 200.0);
        approx(metrics.total_liabilities, 120.0);
        approx(metrics.net_assets, 70.0);
        approx(metrics.debt_ratio, 60.0);
    }

    #[test]
    fn test_liabilities_derived_only_when_absent() {
        let derived = extract_metrics("总资产：100.456亿元\n净资产：40.1亿元");
        approx(derived.total_liabilities, 60.36);
        approx(derived.debt_ratio, 60.09);

        let extracted = extract_metrics("总资产：100亿元\n净资产：40亿元\n总负债：55亿元");
        approx(extracted.total_liabilities, 55.0);
        approx(extracted.debt_ratio, 55.0);
    }

    #[test]
    fn test_debt_ratio_absent_without_assets() {
        let metrics = extract_metrics("总负债：55亿元");
        approx(metrics.total_liabilities, 55.0);
        assert_eq!(metrics.debt_ratio, None);
    }

    #[test]
    fn test_zero_denominator_leaves_ratio_absent() {
        let metrics = extract_metrics("营业收入：0亿元\n净利润：3亿元");
        approx(metrics.revenue, 0.0);
        assert_eq!(metrics.profit_margin, None);
    }

    #[test]
    fn test_roe_is_derived_not_read() {
        let text = "归属于上市公司股东的净利润（千元）\n50,000\n归属于上市公司股东的净资产（千元）\n500,000\n净资产收益率 10.5%";
        let metrics = extract_metrics(text);
        approx(metrics.net_profit, 5.0);
        approx(metrics.net_assets, 50.0);
        approx(metrics.roe, 10.0);
    }

    #[test]
    fn test_profit_margin() {
        let metrics = extract_metrics("营业收入：200亿元\n净利润：30亿元");
        approx(metrics.profit_margin, 15.0);
    }

    #[test]
    fn test_gross_margin_deep_in_table() {
        let header = "毛利率\n分行业 营业收入 营业成本 毛利率 营业收入比上年增减（%） 营业成本比上年增减（%） 毛利率比上年增减（%）\n";
        let text = format!("{}制造业 1,000 700 30.25% 1.2", header);
        assert!(header.chars().count() > 50);
        approx(extract_metrics(&text).gross_margin, 30.25);
    }

    #[test]
    fn test_gross_margin_window_edge_keeps_whole_number() {
        let text = format!("毛利率{}30.25%", "x".repeat(49));
        approx(extract_metrics(&text).gross_margin, 30.25);
    }

    #[test]
    fn test_gross_margin_same_line_fallback() {
        approx(extract_metrics("毛利率为 28.6%").gross_margin, 28.6);
    }

    #[test]
    fn test_empty_text_yields_all_absent() {
        let metrics = extract_metrics("");
        assert_eq!(metrics, MetricSet::default());
        assert_eq!(metrics.found_count(), 0);
    }

    #[test]
    fn test_unlabelled_numbers_are_ignored() {
        let text = "2023年公司实现稳步发展，员工人数 12,345 人，同比增长 8.5%。\n合计 1,234,567";
        assert_eq!(extract_metrics(text), MetricSet::default());
    }

    #[test]
    fn test_table_label_without_value() {
        assert_eq!(extract_metrics("营业收入（千元）").revenue, None);
        assert_eq!(extract_metrics("营业收入（千元）\n——\n不适用").revenue, None);
    }

    #[test]
    fn test_number_cut_by_window_edge_is_rejected() {
        // 窗口末尾只剩 "1,2"
        let text = format!("营业收入（千元）{}1,234,567", "说".repeat(196));
        assert_eq!(extract_metrics(&text).revenue, None);
    }

    #[test]
    fn test_garbled_input_yields_nothing() {
        assert_eq!(extract_metrics("营业收入：abc亿元\n净利润：,.,亿元").revenue, None);

        let overflow = format!("营业收入：{}亿元", "9".repeat(400));
        assert_eq!(extract_metrics(&overflow).revenue, None);

        let noise = "数据,.,%％（千元）\u{FFFD}".repeat(100_000);
        assert_eq!(extract_metrics(&noise), MetricSet::default());
    }

    #[test]
    fn test_serialization_keeps_every_key() {
        let json = serde_json::to_value(extract_metrics("营业收入：10亿元")).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 10);
        for key in MetricKey::ALL {
            assert!(object.contains_key(key.as_str()), "missing {}", key.as_str());
        }
        assert_eq!(object["revenue"], serde_json::json!(10.0));
        assert!(object["roe"].is_null());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let text = "营业收入（千元）\n1,234,567\n净利润：3亿元\n毛利率 12%";
        assert_eq!(extract_metrics(text), extract_metrics(text));
    }

    #[test]
    fn test_default_rules_cover_primary_metrics_only() {
        let extractor = MetricExtractor::new();
        assert_eq!(extractor.rules().len(), 7);
        assert!(extractor.rules().iter().all(|rule| !rule.key.is_derived()));
        assert!(extractor.rules().iter().all(|rule| !rule.strategies.is_empty()));
    }

    #[test]
    fn test_first_success_stops_at_first_hit() {
        let mut calls = 0;
        let hit = first_success(&[None, Some(2), Some(3)], |candidate| {
            calls += 1;
            *candidate
        });
        assert_eq!(hit, Some(2));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_round2_half_away_from_zero() {
        assert_eq!(round2(10.0), 10.0);
        assert_eq!(round2(60.355_f64 + 1e-9), 60.36);
        assert_eq!(round2(-1.005_f64 - 1e-9), -1.01);
    }
}
