//! Prompt construction.
//!
//! Turns a [`ProductContext`] into the system instruction plus a multipart
//! user message: the filled-in briefing text first, then one image part per
//! attached screenshot.

use crate::images::DataUri;
use crate::types::chat::{ChatRequest, ContentPart, Message};
use crate::types::context::ProductContext;

/// Sampling temperature for reports.
pub const REPORT_TEMPERATURE: f32 = 0.7;

/// Completion token budget for reports.
pub const REPORT_MAX_TOKENS: u32 = 4000;

/// Persona and output contract for the model.
pub const SYSTEM_INSTRUCTION: &str = "\
You are the \"Product Council AI\", a high-level strategic advisor and design critic.
Your output must be authoritative, structured, and actionable.
You follow the DEPTH framework: Define Perspectives, Provide Context, Establish Metrics, Task Breakdown, Human Feedback.
You must return the response in highly structured Markdown format.
The language of the response must be CHINESE (Simplified).
Focus on being critical but constructive.";

/// Renders the briefing text for a context.
pub fn render_briefing(context: &ProductContext) -> String {
    format!(
        "# 角色: 虚拟产品战略与设计委员会 (Product Council AI)

## 用户提供的上下文:
- **目标用户 (Target Audience)**: {audience}
- **产品类型 (Product Type)**: {product_type}
- **核心目标 (Primary Goal)**: {goal}
- **当前状态 (Current State)**: {state}

## 指令:
请分析附带的图片（如果有）以及上述产品背景。

请使用 **中文 (Chinese)** 生成一份结构化的 Markdown 报告，包含以下特定部分：

### 第一部分：深度诊断 (🚫 关键阻力点)
找出阻碍核心目标实现的 3 个致命或关键问题。语调要犀利、直接，使用警告风格。

### 第二部分：解决方案路径 (Solution Paths)
提供两个截然不同的战略方向：
**方案 A：速赢策略 (稳健型)** - 开发成本低，确定性高，解决眼前痛点。
**方案 B：北极星策略 (创新型)** - 开发成本高，回报高，重构用户体验。
对于每个方案，请简要描述 UX 交互变化和大致的技术实现逻辑。

### 第三部分：决策矩阵 (Decision Matrix)
创建一个 Markdown 表格，对比方案 A、方案 B 和现状 (Status Quo)。
列包含：指标 (Metric) | 方案 A | 方案 B
行必须包含：开发工作量 (人天估算)、对目标的影响力、风险等级、ROI 评分 (1-10)。

### 第四部分：执行建议
给工程和设计团队的简短下一步行动清单 (Bullet points)。

重要提示:
- 保持简洁专业。
- 使用加粗强调关键点。
- 如果提供了多张图片，请结合所有图片进行综合分析。
- 如果没有提供图片，请仅根据战略背景给出建议，并建议用户上传视觉稿以获得更精准的反馈。
",
        audience = context.target_audience,
        product_type = context.product_type,
        goal = context.primary_goal,
        state = context.current_state,
    )
}

/// Builds the user message parts: briefing text, then images in order.
///
/// Images that are not base64 data URIs are skipped with a warning; the
/// image module only ever produces data URIs.
pub fn build_user_parts(context: &ProductContext) -> Vec<ContentPart> {
    let mut parts = Vec::with_capacity(1 + context.images.len());
    parts.push(ContentPart::text(render_briefing(context)));

    for (index, image) in context.images.iter().enumerate() {
        match DataUri::parse(image) {
            Ok(uri) => parts.push(ContentPart::image_url(uri.to_uri())),
            Err(e) => tracing::warn!(index, error = %e, "Skipping malformed image"),
        }
    }

    parts
}

/// Builds the system and user messages for a context.
pub fn build_messages(context: &ProductContext) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_INSTRUCTION),
        Message::user_parts(build_user_parts(context)),
    ]
}

/// Builds the full streaming request for a context.
pub fn build_request(context: &ProductContext, model: &str) -> ChatRequest {
    ChatRequest::streaming(model, build_messages(context))
        .with_temperature(REPORT_TEMPERATURE)
        .with_max_tokens(REPORT_MAX_TOKENS)
}
