//! Shared fixtures for unit tests.

use std::sync::Arc;

use quarry_expr::ScalarType;

use crate::catalog::{EntityDef, FieldDef, Model, RelationDef};
use crate::config::QueryOptions;
use crate::context::QueryProcessingContext;
use crate::descriptor::{MetadataProvider, ModelProvider};

/// Users, their posts and the posts' comments.
///
/// `Post.author` is optional (left join), `Comment.post` is required
/// (inner join) and users are soft-deleted.
pub(crate) fn blog_model() -> Model {
    Model::new("blog")
        .with_entity(
            EntityDef::new("User", "id")
                .with_table("users")
                .with_field(FieldDef::new("id", ScalarType::Int64))
                .with_field(FieldDef::new("name", ScalarType::String))
                .with_field(FieldDef::optional("email", ScalarType::String))
                .with_field(FieldDef::optional("age", ScalarType::Int32))
                .with_soft_delete(),
        )
        .with_entity(
            EntityDef::new("Post", "id")
                .with_table("posts")
                .with_field(FieldDef::new("id", ScalarType::Int64))
                .with_field(FieldDef::optional("author_id", ScalarType::Int64))
                .with_field(FieldDef::new("title", ScalarType::String))
                .with_field(FieldDef::new("views", ScalarType::Int32))
                .with_field(FieldDef::optional("published", ScalarType::Timestamp)),
        )
        .with_entity(
            EntityDef::new("Comment", "id")
                .with_table("comments")
                .with_field(FieldDef::new("id", ScalarType::Int64))
                .with_field(FieldDef::new("post_id", ScalarType::Int64))
                .with_field(FieldDef::new("body", ScalarType::String)),
        )
        .with_relation(
            RelationDef::one_to_many("post_author", "Post", "author_id", "User", "id")
                .with_navigation("author")
                .with_inverse("posts"),
        )
        .with_relation(
            RelationDef::one_to_many("comment_post", "Comment", "post_id", "Post", "id")
                .with_navigation("post")
                .with_inverse("comments"),
        )
}

/// A processing context over the blog model.
pub(crate) fn blog_context(options: QueryOptions) -> QueryProcessingContext {
    let provider = ModelProvider::new(blog_model()).expect("valid model");
    let descriptors = provider.descriptors(&options).expect("descriptors");
    QueryProcessingContext::new(Arc::new(descriptors), options)
}
