// ==========================================
// 动态台账导入系统 - 元数据上下文
// ==========================================
// 职责: 为一次导入运行构建不可变的元数据快照
// - 字段定义 / 可写字段 / 选项 / 关联 / 多语言名称 / 禁用字符
// - 用户目录: 仅当存在 user 类型字段时加载
// - 用户组目录: 仅当表头包含 owner 列时加载
// 红线: 快照构建后只读,校验器/关联检查/提交阶段共享引用,无需加锁
// ==========================================

use crate::domain::field::{FieldDefinition, GroupEntry, LabelTable, RelationDefinition};
use crate::domain::request::ImportRequest;
use crate::domain::types::FieldType;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::header::HeaderScan;
use crate::importer::message::Message;
use crate::repository::error::RepositoryError;
use crate::repository::schema_repo::SchemaSource;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, instrument};

// ==========================================
// SchemaContext - 元数据快照
// ==========================================
#[derive(Debug, Clone)]
pub struct SchemaContext {
    pub tenant: String,
    pub app_id: String,
    pub datastore_id: String,
    /// 消息语言
    pub locale: String,
    pub relations: Vec<RelationDefinition>,
    pub labels: LabelTable,
    fields: HashMap<String, FieldDefinition>,
    writable: HashSet<String>,
    /// 选项组 -> 有效（未删除）选项值
    option_codes: HashMap<String, HashSet<String>>,
    /// 选项组 -> 显示名称 -> 选项值
    option_by_label: HashMap<String, HashMap<String, String>>,
    /// 用户名 -> 用户 ID（未加载时为 None）
    users: Option<HashMap<String, String>>,
    /// 组名称 -> 访问键（未加载时为 None）
    groups: Option<HashMap<String, String>>,
    disallowed: Vec<char>,
}

impl SchemaContext {
    /// 可写入的输入字段（服务端计算字段除外）
    pub fn input_field(&self, field_id: &str) -> Option<&FieldDefinition> {
        self.fields
            .get(field_id)
            .filter(|f| self.writable.contains(field_id) && !f.field_type.is_server_computed())
    }

    /// 台账字段定义（不考虑权限）
    pub fn field(&self, field_id: &str) -> Option<&FieldDefinition> {
        self.fields.get(field_id)
    }

    /// 可写入的必填字段,按字段 ID 排序
    pub fn required_fields(&self) -> Vec<&FieldDefinition> {
        let mut required: Vec<&FieldDefinition> = self
            .fields
            .values()
            .filter(|f| f.is_required && self.input_field(&f.field_id).is_some())
            .collect();
        required.sort_by(|a, b| a.field_id.cmp(&b.field_id));
        required
    }

    pub fn datastore_label(&self) -> String {
        self.labels.datastore_label(&self.datastore_id)
    }

    pub fn field_label(&self, field_id: &str) -> String {
        self.labels.field_label(&self.datastore_id, field_id)
    }

    /// 选项显示名称 -> 选项值
    ///
    /// # 返回
    /// - None: 名称无法解析,或选项值已删除
    pub fn resolve_option(&self, option_group_id: &str, label: &str) -> Option<&str> {
        let code = self.option_by_label.get(option_group_id)?.get(label)?;
        self.option_codes
            .get(option_group_id)
            .filter(|codes| codes.contains(code))
            .map(|_| code.as_str())
    }

    /// 用户名 -> 用户 ID
    pub fn resolve_user(&self, user_name: &str) -> Option<&str> {
        self.users.as_ref()?.get(user_name).map(String::as_str)
    }

    /// 组名称 -> 访问键（仅限操作者所在组及其下级组）
    pub fn resolve_group(&self, group_label: &str) -> Option<&str> {
        self.groups.as_ref()?.get(group_label).map(String::as_str)
    }

    pub fn users_loaded(&self) -> bool {
        self.users.is_some()
    }

    pub fn groups_loaded(&self) -> bool {
        self.groups.is_some()
    }

    /// 文本中出现的禁用字符（去重,按出现顺序）
    pub fn disallowed_in(&self, text: &str) -> Vec<char> {
        let mut found = Vec::new();
        for c in text.chars() {
            if self.disallowed.contains(&c) && !found.contains(&c) {
                found.push(c);
            }
        }
        found
    }
}

// ==========================================
// SchemaContextBuilder - 快照构造
// ==========================================
// 加载器与测试共用,保证快照只能整体构建
#[derive(Debug, Default)]
pub struct SchemaContextBuilder {
    tenant: String,
    app_id: String,
    datastore_id: String,
    locale: String,
    fields: Vec<FieldDefinition>,
    writable: Option<Vec<String>>,
    options: Vec<crate::domain::field::OptionEntry>,
    users: Option<Vec<crate::domain::field::UserEntry>>,
    groups: Option<(String, Vec<GroupEntry>)>,
    relations: Vec<RelationDefinition>,
    labels: LabelTable,
    disallowed: String,
}

impl SchemaContextBuilder {
    pub fn new(tenant: &str, app_id: &str, datastore_id: &str, locale: &str) -> Self {
        Self {
            tenant: tenant.to_string(),
            app_id: app_id.to_string(),
            datastore_id: datastore_id.to_string(),
            locale: locale.to_string(),
            ..Default::default()
        }
    }

    pub fn fields(mut self, fields: Vec<FieldDefinition>) -> Self {
        self.fields = fields;
        self
    }

    /// 可写字段（未设置时全部字段可写）
    pub fn writable(mut self, field_ids: Vec<String>) -> Self {
        self.writable = Some(field_ids);
        self
    }

    pub fn options(mut self, options: Vec<crate::domain::field::OptionEntry>) -> Self {
        self.options = options;
        self
    }

    pub fn users(mut self, users: Vec<crate::domain::field::UserEntry>) -> Self {
        self.users = Some(users);
        self
    }

    /// 用户组目录（以 root_group_id 为根）
    pub fn groups(mut self, root_group_id: &str, groups: Vec<GroupEntry>) -> Self {
        self.groups = Some((root_group_id.to_string(), groups));
        self
    }

    pub fn relations(mut self, relations: Vec<RelationDefinition>) -> Self {
        self.relations = relations;
        self
    }

    pub fn labels(mut self, labels: LabelTable) -> Self {
        self.labels = labels;
        self
    }

    /// 禁用字符配置（逗号分隔）
    pub fn disallowed(mut self, raw: &str) -> Self {
        self.disallowed = raw.to_string();
        self
    }

    pub fn build(self) -> SchemaContext {
        let writable: HashSet<String> = match self.writable {
            Some(ids) => ids.into_iter().collect(),
            None => self.fields.iter().map(|f| f.field_id.clone()).collect(),
        };

        let mut option_codes: HashMap<String, HashSet<String>> = HashMap::new();
        let mut option_by_label: HashMap<String, HashMap<String, String>> = HashMap::new();
        for entry in &self.options {
            let label = self
                .labels
                .option_label(&entry.option_group_id, &entry.option_value)
                .unwrap_or(&entry.option_value)
                .to_string();
            option_by_label
                .entry(entry.option_group_id.clone())
                .or_default()
                .entry(label)
                .or_insert_with(|| entry.option_value.clone());
            if !entry.deleted {
                option_codes
                    .entry(entry.option_group_id.clone())
                    .or_default()
                    .insert(entry.option_value.clone());
            }
        }

        let users = self.users.map(|users| {
            let mut map = HashMap::new();
            for u in users {
                map.entry(u.user_name).or_insert(u.user_id);
            }
            map
        });

        let labels = self.labels;
        let groups = self.groups.map(|(root, entries)| {
            valid_groups(&root, &entries)
                .into_iter()
                .map(|g| {
                    let label = labels
                        .group_label(&g.group_id)
                        .unwrap_or(&g.group_id)
                        .to_string();
                    (label, g.access_key.clone())
                })
                .collect()
        });

        SchemaContext {
            tenant: self.tenant,
            app_id: self.app_id,
            datastore_id: self.datastore_id,
            locale: self.locale,
            relations: self.relations,
            fields: self
                .fields
                .into_iter()
                .map(|f| (f.field_id.clone(), f))
                .collect(),
            writable,
            option_codes,
            option_by_label,
            users,
            groups,
            disallowed: parse_disallowed(&self.disallowed),
            labels,
        }
    }
}

/// 根组及其全部下级组
fn valid_groups<'a>(root: &str, entries: &'a [GroupEntry]) -> Vec<&'a GroupEntry> {
    let mut result = Vec::new();
    let mut queue = VecDeque::from([root.to_string()]);
    let mut seen = HashSet::new();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(entry) = entries.iter().find(|g| g.group_id == id) {
            result.push(entry);
        }
        for child in entries
            .iter()
            .filter(|g| g.parent_group_id.as_deref() == Some(id.as_str()))
        {
            queue.push_back(child.group_id.clone());
        }
    }
    result
}

/// "#,$,%" -> ['#', '$', '%']
fn parse_disallowed(raw: &str) -> Vec<char> {
    let mut chars = Vec::new();
    for c in raw.split(',').flat_map(|piece| piece.trim().chars()) {
        if !chars.contains(&c) {
            chars.push(c);
        }
    }
    chars
}

// ==========================================
// SchemaContextLoader - 元数据加载
// ==========================================
pub struct SchemaContextLoader {
    source: Arc<dyn SchemaSource>,
}

impl SchemaContextLoader {
    pub fn new(source: Arc<dyn SchemaSource>) -> Self {
        Self { source }
    }

    /// 加载元数据快照
    ///
    /// # 参数
    /// - request: 导入请求（租户/台账/角色/操作者组）
    /// - header: 表头扫描结果（决定是否加载用户组目录）
    /// - locale: 消息语言
    ///
    /// # 错误
    /// - 任一元数据来源失败: SchemaMismatch（致命,不重试）
    #[instrument(skip(self, request, header), fields(datastore_id = %request.datastore_id))]
    pub async fn load(
        &self,
        request: &ImportRequest,
        header: &HeaderScan,
        locale: &str,
    ) -> ImportResult<SchemaContext> {
        let source = &self.source;
        let (fields, writable, datastore, options, labels, disallowed) = tokio::try_join!(
            source.find_fields(&request.app_id, &request.datastore_id),
            source.find_writable_fields(&request.datastore_id, &request.actor.role_ids),
            source.find_datastore(&request.datastore_id),
            source.find_options(&request.app_id),
            source.find_labels(&request.tenant, &request.app_id, locale),
            source.find_disallowed_chars(&request.tenant),
        )
        .map_err(schema_error)?;

        let mut builder = SchemaContextBuilder::new(
            &request.tenant,
            &request.app_id,
            &request.datastore_id,
            locale,
        )
        .writable(writable)
        .options(options)
        .relations(datastore.relations)
        .labels(labels)
        .disallowed(&disallowed);

        if fields.iter().any(|f| f.field_type == FieldType::User) {
            debug!("存在用户字段,加载用户目录");
            let users = source
                .find_users(&request.tenant, &request.app_id)
                .await
                .map_err(schema_error)?;
            builder = builder.users(users);
        }

        if header.has_owner {
            debug!("表头包含 owner 列,加载用户组目录");
            let groups = source
                .find_groups(&request.tenant)
                .await
                .map_err(schema_error)?;
            builder = builder.groups(&request.actor.group_id, groups);
        }

        let ctx = builder.fields(fields).build();
        info!(
            fields = ctx.fields.len(),
            relations = ctx.relations.len(),
            users_loaded = ctx.users_loaded(),
            groups_loaded = ctx.groups_loaded(),
            "元数据快照加载完成"
        );
        Ok(ctx)
    }
}

fn schema_error(err: RepositoryError) -> ImportError {
    ImportError::SchemaMismatch(Message::new("import.fatal.schema_load").arg("reason", err))
}
