use crate::types::ReflectionVerdict;

/// 反思后的去向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopDecision {
    /// 结束循环，进入终稿。`forced` 表示因达到上限而接受
    Accept { forced: bool },
    /// 带着修改意见回到查询生成
    Continue { feedback: String },
}

/// 通过则结束；未通过但计数已达上限时强制接受；否则继续
pub fn decide(verdict: &ReflectionVerdict, iteration: u32, cap: u32) -> LoopDecision {
    match verdict {
        ReflectionVerdict::Accept => LoopDecision::Accept { forced: false },
        ReflectionVerdict::Revise(_) if iteration >= cap => LoopDecision::Accept { forced: true },
        ReflectionVerdict::Revise(_) => LoopDecision::Continue {
            feedback: verdict.feedback().to_string(),
        },
    }
}
